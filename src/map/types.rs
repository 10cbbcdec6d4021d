//! Core ID types for the world map arena.

/// Unique identifier for a Frame within the WorldMap.
///
/// FrameIds are assigned sequentially when frames are created. They serve as
/// lightweight handles so that points and local maps can reference frames
/// without Rc/Arc and without cyclic ownership.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FrameId(pub u64);

impl FrameId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "F{}", self.0)
    }
}

/// Unique identifier for a Landmark within the WorldMap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LandmarkId(pub u64);

impl LandmarkId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LandmarkId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Unique identifier for a LocalMap within the WorldMap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LocalMapId(pub u64);

impl LocalMapId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for LocalMapId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LM{}", self.0)
    }
}

/// Weak, index-based reference to a point of a frame.
///
/// `index` is the position in the frame's point collection. A frame's
/// collection is only compacted while it is the current frame, before any
/// successor links to it, so the index stays valid for the frame's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FramePointRef {
    pub frame: FrameId,
    pub index: usize,
}

impl FramePointRef {
    pub fn new(frame: FrameId, index: usize) -> Self {
        Self { frame, index }
    }
}

impl std::fmt::Display for FramePointRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}#{}", self.frame, self.index)
    }
}
