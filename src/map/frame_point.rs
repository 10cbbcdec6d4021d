//! FramePoint - a single point observation in one frame.
//!
//! Points form tracks through a single backward link to the point they were
//! tracked from in the previous frame. The track length is the depth of that
//! chain and gates landmark creation.

use nalgebra::{Vector2, Vector3};

use super::types::{FrameId, FramePointRef, LandmarkId};

/// Number of bytes of a binary appearance descriptor (256 bits).
pub const DESCRIPTOR_BYTES: usize = 32;

/// Fixed-length binary appearance descriptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Descriptor(pub [u8; DESCRIPTOR_BYTES]);

impl Descriptor {
    pub fn zeros() -> Self {
        Self([0; DESCRIPTOR_BYTES])
    }

    /// Hamming distance: the number of differing bits.
    pub fn distance(&self, other: &Descriptor) -> u32 {
        self.0
            .iter()
            .zip(other.0.iter())
            .map(|(a, b)| (a ^ b).count_ones())
            .sum()
    }
}

impl Default for Descriptor {
    fn default() -> Self {
        Self::zeros()
    }
}

/// Pixel cell of the candidate grid a point was detected in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

impl GridCell {
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }
}

/// One point observation in one frame.
#[derive(Debug, Clone)]
pub struct FramePoint {
    /// Frame the point was detected in.
    pub frame: FrameId,
    /// Grid cell of the detection; unique per frame.
    pub cell: GridCell,

    /// Left image coordinates (x = column, y = row).
    pub image_left: Vector2<f64>,
    /// Right image coordinates for stereo detections.
    pub image_right: Option<Vector2<f64>>,
    pub descriptor: Descriptor,

    /// Triangulated position in the robot frame.
    pub robot_coordinates: Vector3<f64>,
    /// Position in the world frame under the frame's latest pose.
    pub world_coordinates: Vector3<f64>,
    /// Depth in the camera frame.
    pub depth: f64,
    /// Whether the point lies within the near-depth band.
    pub is_near: bool,

    pub landmark: Option<LandmarkId>,
    /// Point in the previous frame this one was tracked from.
    pub previous: Option<FramePointRef>,
    /// First point of the track.
    pub origin: Option<FramePointRef>,
    /// Number of backward links in the track chain.
    pub track_length: usize,
}

impl FramePoint {
    /// Create a fresh, untracked point.
    pub fn new(
        frame: FrameId,
        cell: GridCell,
        image_left: Vector2<f64>,
        descriptor: Descriptor,
        robot_coordinates: Vector3<f64>,
        depth: f64,
        is_near: bool,
    ) -> Self {
        Self {
            frame,
            cell,
            image_left,
            image_right: None,
            descriptor,
            robot_coordinates,
            world_coordinates: robot_coordinates,
            depth,
            is_near,
            landmark: None,
            previous: None,
            origin: None,
            track_length: 0,
        }
    }

    /// Link this point to its predecessor in the previous frame.
    ///
    /// The track inherits the predecessor's landmark and origin.
    pub fn link_to(&mut self, previous: &FramePoint, previous_ref: FramePointRef) {
        self.previous = Some(previous_ref);
        self.landmark = previous.landmark;
        self.origin = Some(previous.origin.unwrap_or(previous_ref));
        self.track_length = previous.track_length + 1;
    }

    pub fn has_landmark(&self) -> bool {
        self.landmark.is_some()
    }

    pub fn image_row(&self) -> i64 {
        self.image_left.y.round() as i64
    }

    pub fn image_col(&self) -> i64 {
        self.image_left.x.round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(frame: u64, row: usize, col: usize) -> FramePoint {
        FramePoint::new(
            FrameId::new(frame),
            GridCell::new(row, col),
            Vector2::new(col as f64, row as f64),
            Descriptor::zeros(),
            Vector3::new(0.0, 0.0, 2.0),
            2.0,
            true,
        )
    }

    #[test]
    fn test_descriptor_distance() {
        let a = Descriptor::zeros();
        let mut bytes = [0u8; DESCRIPTOR_BYTES];
        bytes[0] = 0b1011_0000;
        bytes[31] = 0xff;
        let b = Descriptor(bytes);

        assert_eq!(a.distance(&b), 11);
        assert_eq!(b.distance(&a), 11);
        assert_eq!(b.distance(&b), 0);
    }

    #[test]
    fn test_link_to_extends_track() {
        let mut first = point(0, 10, 10);
        first.landmark = Some(LandmarkId::new(4));
        let first_ref = FramePointRef::new(FrameId::new(0), 0);

        let mut second = point(1, 11, 12);
        second.link_to(&first, first_ref);
        assert_eq!(second.track_length, 1);
        assert_eq!(second.origin, Some(first_ref));
        assert_eq!(second.landmark, Some(LandmarkId::new(4)));

        let second_ref = FramePointRef::new(FrameId::new(1), 3);
        let mut third = point(2, 12, 14);
        third.link_to(&second, second_ref);
        assert_eq!(third.track_length, 2);
        assert_eq!(third.previous, Some(second_ref));
        assert_eq!(third.origin, Some(first_ref));
    }

    #[test]
    fn test_image_rounding() {
        let mut p = point(0, 0, 0);
        p.image_left = Vector2::new(10.6, 3.4);
        assert_eq!(p.image_col(), 11);
        assert_eq!(p.image_row(), 3);
    }
}
