//! LocalMap - a contiguous trajectory segment with its active landmarks.

use nalgebra::Vector3;

use crate::geometry::SE3;

use super::frame_point::Descriptor;
use super::types::{FrameId, LandmarkId, LocalMapId};

/// Appearance snapshot of a landmark inside a local map.
///
/// Items are the unit of appearance matching for loop closure.
#[derive(Debug, Clone)]
pub struct LandmarkItem {
    pub landmark: LandmarkId,
    pub descriptor: Descriptor,
    /// Landmark coordinates in the local map frame.
    pub coordinates: Vector3<f64>,
}

/// Relative alignment recorded by a loop-closure merge.
#[derive(Debug, Clone, Copy)]
pub struct LoopClosure {
    pub reference: LocalMapId,
    pub query_to_reference: SE3,
}

/// A closed segment of the trajectory.
#[derive(Debug, Clone)]
pub struct LocalMap {
    pub id: LocalMapId,

    /// Frames of the segment in trajectory order.
    pub frames: Vec<FrameId>,

    /// Pose of the segment's anchor (its last frame).
    pub local_map_to_world: SE3,

    /// Landmarks tracked while the segment was open.
    pub items: Vec<LandmarkItem>,

    /// Closures recorded with this map as the query.
    pub closures: Vec<LoopClosure>,

    pub previous: Option<LocalMapId>,
    pub next: Option<LocalMapId>,
}

impl LocalMap {
    pub fn new(
        id: LocalMapId,
        frames: Vec<FrameId>,
        local_map_to_world: SE3,
        items: Vec<LandmarkItem>,
        previous: Option<LocalMapId>,
    ) -> Self {
        Self {
            id,
            frames,
            local_map_to_world,
            items,
            closures: Vec::new(),
            previous,
            next: None,
        }
    }

    pub fn first_frame(&self) -> Option<FrameId> {
        self.frames.first().copied()
    }

    pub fn last_frame(&self) -> Option<FrameId> {
        self.frames.last().copied()
    }

    pub fn contains_landmark(&self, landmark: LandmarkId) -> bool {
        self.items.iter().any(|item| item.landmark == landmark)
    }

    pub fn add_closure(&mut self, reference: LocalMapId, query_to_reference: SE3) {
        self.closures.push(LoopClosure {
            reference,
            query_to_reference,
        });
    }
}
