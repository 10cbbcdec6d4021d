//! Feature stage that renders the synthetic scene.

use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

use crate::error::{Result, SlamError};
use crate::map::{Frame, FramePoint, GridCell};
use crate::tracking::{CandidateGrid, FeatureStage};

use super::scene::SyntheticScene;

/// Candidates are exact projections of the scene points, with optional
/// multiplicative depth noise.
///
/// The ground truth pose of a frame is looked up by frame index, so frames
/// must be created in scene order.
pub struct SyntheticFeatureStage {
    scene: Arc<SyntheticScene>,
    /// Relative depth noise amplitude; 0 disables noise.
    depth_noise: f64,
    /// Depth (m) up to which a point counts as near.
    maximum_depth_near: f64,
    /// Points beyond this depth (m) are not detected.
    maximum_depth: f64,
    rng: StdRng,
}

impl SyntheticFeatureStage {
    pub fn new(scene: Arc<SyntheticScene>) -> Self {
        let rng = StdRng::seed_from_u64(scene.config.seed.wrapping_add(1));
        Self {
            scene,
            depth_noise: 0.0,
            maximum_depth_near: 5.0,
            maximum_depth: 20.0,
            rng,
        }
    }

    pub fn with_depth_noise(mut self, depth_noise: f64) -> Self {
        self.depth_noise = depth_noise;
        self
    }

    pub fn scene(&self) -> &SyntheticScene {
        &self.scene
    }
}

impl FeatureStage for SyntheticFeatureStage {
    fn compute(&mut self, frame: &Frame) -> Result<CandidateGrid> {
        let robot_to_world = self
            .scene
            .pose(frame.id.0 as usize)
            .ok_or_else(|| SlamError::FeatureStage(format!("no ground truth pose for {}", frame.id)))?;
        let camera = &self.scene.camera;
        let world_to_robot = robot_to_world.inverse();
        let world_to_camera = camera.world_to_camera(robot_to_world);

        let mut grid = CandidateGrid::new(camera.rows, camera.cols);
        let mut dropped = 0;
        for point in &self.scene.points {
            let Some(pixel) = camera.project_world(&world_to_camera, &point.position) else {
                continue;
            };
            let depth = world_to_camera.transform_point(&point.position).z;
            if depth > self.maximum_depth {
                continue;
            }

            let mut robot_coordinates = world_to_robot.transform_point(&point.position);
            if self.depth_noise > 0.0 {
                robot_coordinates *= 1.0 + self.rng.gen_range(-self.depth_noise..self.depth_noise);
            }

            let candidate = FramePoint::new(
                frame.id,
                GridCell::new(0, 0),
                pixel,
                point.descriptor,
                robot_coordinates,
                depth,
                depth <= self.maximum_depth_near,
            );
            if grid.insert(candidate).is_some() {
                dropped += 1;
            }
        }

        trace!("{}: rendered {} candidates ({} dropped)", frame.id, grid.len(), dropped);
        Ok(grid)
    }

    fn image_rows(&self) -> usize {
        self.scene.camera.rows
    }

    fn image_cols(&self) -> usize {
        self.scene.camera.cols
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::SE3;
    use crate::map::FrameId;
    use crate::sim::SceneConfig;

    #[test]
    fn test_renders_visible_points() {
        let scene = Arc::new(SyntheticScene::generate(SceneConfig::default()));
        let mut stage = SyntheticFeatureStage::new(scene.clone());
        let frame = Frame::new(FrameId::new(0), 0.0, SE3::identity(), None);

        let grid = stage.compute(&frame).unwrap();
        assert!(grid.len() > 100, "only {} candidates", grid.len());

        let camera = scene.camera;
        let world_to_camera = camera.world_to_camera(&scene.trajectory[0]);
        for (cell, candidate) in grid.iter() {
            assert_eq!(candidate.cell, *cell);
            assert!(candidate.depth > 0.0);
            let pixel = camera.project_world(&world_to_camera, &candidate.robot_coordinates).unwrap();
            assert!((pixel - candidate.image_left).norm() < 1e-9);
        }
    }

    #[test]
    fn test_unknown_frame_fails() {
        let scene = Arc::new(SyntheticScene::generate(SceneConfig {
            number_of_frames: 2,
            ..SceneConfig::default()
        }));
        let mut stage = SyntheticFeatureStage::new(scene);
        let frame = Frame::new(FrameId::new(5), 0.25, SE3::identity(), None);
        assert!(matches!(stage.compute(&frame), Err(SlamError::FeatureStage(_))));
    }
}
