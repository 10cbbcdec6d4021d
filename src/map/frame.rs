//! Frame - one camera frame with its point observations.
//!
//! Frames are owned by the WorldMap and chained in trajectory order through
//! their previous/next ids.

use std::collections::HashSet;

use crate::geometry::SE3;

use super::frame_point::FramePoint;
use super::types::{FrameId, LocalMapId};

/// Tracking status a frame was processed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameStatus {
    #[default]
    Localizing,
    Tracking,
}

/// A single frame of the trajectory.
#[derive(Debug, Clone)]
pub struct Frame {
    pub id: FrameId,
    /// Acquisition time in seconds.
    pub timestamp: f64,
    pub robot_to_world: SE3,
    pub status: FrameStatus,

    /// Point observations in insertion order.
    ///
    /// Only compacted while this is the current frame.
    pub points: Vec<FramePoint>,

    pub previous: Option<FrameId>,
    pub next: Option<FrameId>,

    /// Local map this frame was closed into, if any.
    pub local_map: Option<LocalMapId>,
}

impl Frame {
    pub fn new(id: FrameId, timestamp: f64, robot_to_world: SE3, previous: Option<FrameId>) -> Self {
        Self {
            id,
            timestamp,
            robot_to_world,
            status: FrameStatus::Localizing,
            points: Vec::new(),
            previous,
            next: None,
            local_map: None,
        }
    }

    pub fn world_to_robot(&self) -> SE3 {
        self.robot_to_world.inverse()
    }

    pub fn num_points(&self) -> usize {
        self.points.len()
    }

    /// Number of points whose track reached `min_track_length`.
    pub fn count_points(&self, min_track_length: usize) -> usize {
        self.points
            .iter()
            .filter(|p| p.track_length >= min_track_length)
            .count()
    }

    /// Recompute every point's world coordinates from the frame pose.
    pub fn update_world_coordinates(&mut self) {
        let robot_to_world = self.robot_to_world;
        for point in &mut self.points {
            point.world_coordinates = robot_to_world.transform_point(&point.robot_coordinates);
        }
    }

    pub fn clear_points(&mut self) {
        self.points.clear();
    }

    /// Whether no two points came from the same grid cell.
    pub fn has_unique_cells(&self) -> bool {
        let mut cells = HashSet::with_capacity(self.points.len());
        self.points.iter().all(|p| cells.insert(p.cell))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::frame_point::{Descriptor, GridCell};
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    fn point_with_track(track_length: usize) -> FramePoint {
        let mut p = FramePoint::new(
            FrameId::new(0),
            GridCell::new(0, track_length),
            Vector2::zeros(),
            Descriptor::zeros(),
            Vector3::new(1.0, 0.0, 0.0),
            1.0,
            true,
        );
        p.track_length = track_length;
        p
    }

    #[test]
    fn test_count_points() {
        let mut frame = Frame::new(FrameId::new(0), 0.0, SE3::identity(), None);
        frame.points = (0..6).map(point_with_track).collect();

        assert_eq!(frame.count_points(0), 6);
        assert_eq!(frame.count_points(3), 3);
        assert_eq!(frame.count_points(10), 0);
    }

    #[test]
    fn test_update_world_coordinates() {
        let pose = SE3::from_translation(Vector3::new(0.0, 2.0, 0.0));
        let mut frame = Frame::new(FrameId::new(1), 0.1, pose, Some(FrameId::new(0)));
        frame.points.push(point_with_track(1));

        frame.update_world_coordinates();
        assert_relative_eq!(
            frame.points[0].world_coordinates,
            Vector3::new(1.0, 2.0, 0.0),
            epsilon = 1e-12
        );
    }
}
