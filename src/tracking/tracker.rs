//! Tracker: the per-frame tracking state machine.
//!
//! Each call to [`Tracker::compute`] processes one frame:
//! - predict the pose with the motion prior (odometry or constant velocity)
//! - create the frame and run the feature stage
//! - link previous points to candidates (correspondence search)
//! - refine the pose and, depending on the state, promote landmarks
//!   (Localizing) or prune, recover and fuse (Tracking)
//! - admit the remaining candidates as new points
//! - add the accepted motion to the local map window
//!
//! A failing feature stage leaves the map and the motion prior as they were.
//! Losing the track is a state transition back to Localizing, not an error.

use serde::Deserialize;

use crate::error::{Result, SlamError};
use crate::geometry::{Camera, SE3};
use crate::map::{FrameId, FrameStatus, LandmarkFusion, WeightedMeanFusion, WorldMap};

use super::candidate_grid::CandidateGrid;
use super::correspondence::{CorrespondenceResult, CorrespondenceSearch, SearchParameters};
use super::feature_stage::{FeatureStage, MatchingThresholds};
use super::motion_model::{is_significant, MotionModel};
use super::pose_solver::{PoseProblem, PoseSolution, PoseSolver, Residual};
use super::pruning::{admit_new_points, prune_points};
use super::result::{TrackerStats, TrackingResult};
use super::TrackingState;

/// Lower bound of the framepoint residual weight while tracking.
const MINIMUM_WEIGHT_FRAMEPOINT: f64 = 0.1;

/// Close landmarks count this many times more than far ones when lowering
/// the framepoint weight.
const CLOSE_LANDMARK_FACTOR: usize = 7;

/// Configuration for the tracker.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Inliers needed to stay in Tracking; Localizing needs twice as many.
    pub minimum_number_of_landmarks_to_track: usize,

    /// Track length at which a point becomes a landmark.
    pub minimum_track_length_for_landmark_creation: usize,

    /// Half width (px) of the vicinity search window.
    pub range_point_tracking: usize,

    /// Pixel distance threshold after a Tracking cycle.
    pub pixel_distance_tracking_threshold_minimum: usize,

    /// Pixel distance threshold after a Localizing cycle.
    pub pixel_distance_tracking_threshold_maximum: usize,

    /// Squared pixel flow allowed between consecutive observations.
    pub maximum_flow_pixels_squared: i64,

    /// Descriptor distance gate of the vicinity stage.
    pub matching_distance_tracking_point: u32,

    /// Descriptor distance gate of the regional stage.
    pub matching_distance_tracking_region: u32,

    /// Rotation (rad) below which a refined pose counts as no motion.
    pub minimum_delta_angular_for_movement: f64,

    /// Translation (m) below which a refined pose counts as no motion.
    pub minimum_delta_translational_for_movement: f64,

    /// Search lost landmark points again after pose refinement.
    pub enable_point_recovery: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            minimum_number_of_landmarks_to_track: 5,
            minimum_track_length_for_landmark_creation: 3,
            range_point_tracking: 2,
            pixel_distance_tracking_threshold_minimum: 16,
            pixel_distance_tracking_threshold_maximum: 49,
            maximum_flow_pixels_squared: 150 * 150,
            matching_distance_tracking_point: 50,
            matching_distance_tracking_region: 50,
            minimum_delta_angular_for_movement: 0.001,
            minimum_delta_translational_for_movement: 0.01,
            enable_point_recovery: true,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.minimum_number_of_landmarks_to_track == 0 {
            return Err(SlamError::InvalidConfig(
                "minimum_number_of_landmarks_to_track must be positive".into(),
            ));
        }
        if self.pixel_distance_tracking_threshold_minimum > self.pixel_distance_tracking_threshold_maximum {
            return Err(SlamError::InvalidConfig(format!(
                "pixel distance threshold minimum {} exceeds maximum {}",
                self.pixel_distance_tracking_threshold_minimum, self.pixel_distance_tracking_threshold_maximum
            )));
        }
        if self.range_point_tracking == 0 {
            return Err(SlamError::InvalidConfig("range_point_tracking must be positive".into()));
        }
        if self.maximum_flow_pixels_squared <= 0 {
            return Err(SlamError::InvalidConfig(
                "maximum_flow_pixels_squared must be positive".into(),
            ));
        }
        if self.minimum_delta_angular_for_movement < 0.0 || self.minimum_delta_translational_for_movement < 0.0 {
            return Err(SlamError::InvalidConfig("movement thresholds must be non-negative".into()));
        }
        Ok(())
    }

    fn matching_thresholds(&self) -> MatchingThresholds {
        MatchingThresholds {
            point: self.matching_distance_tracking_point,
            region: self.matching_distance_tracking_region,
        }
    }
}

/// Residual weight of points without a validated landmark.
///
/// Lowered as more landmarks (close ones counting sevenfold) are tracked,
/// floored at 0.1. Without tracked points the weight is 1.
pub fn framepoint_weight(correspondence: &CorrespondenceResult) -> f64 {
    if correspondence.tracked_points == 0 {
        return 1.0;
    }
    let landmark_share = (correspondence.tracked_landmarks_far
        + CLOSE_LANDMARK_FACTOR * correspondence.tracked_landmarks_close) as f64
        / correspondence.tracked_points as f64;
    (1.0 - landmark_share).max(MINIMUM_WEIGHT_FRAMEPOINT)
}

/// Builder for [`Tracker`]; reports missing collaborators as errors.
#[derive(Default)]
pub struct TrackerBuilder {
    config: TrackerConfig,
    camera: Option<Camera>,
    feature_stage: Option<Box<dyn FeatureStage>>,
    pose_solver: Option<Box<dyn PoseSolver>>,
    fusion: Option<Box<dyn LandmarkFusion>>,
}

impl TrackerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn camera(mut self, camera: Camera) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn feature_stage(mut self, feature_stage: impl FeatureStage + 'static) -> Self {
        self.feature_stage = Some(Box::new(feature_stage));
        self
    }

    pub fn pose_solver(mut self, pose_solver: impl PoseSolver + 'static) -> Self {
        self.pose_solver = Some(Box::new(pose_solver));
        self
    }

    /// Landmark fusion strategy; defaults to [`WeightedMeanFusion`].
    pub fn landmark_fusion(mut self, fusion: impl LandmarkFusion + 'static) -> Self {
        self.fusion = Some(Box::new(fusion));
        self
    }

    pub fn build(self) -> Result<Tracker> {
        self.config.validate()?;
        let camera = self.camera.ok_or(SlamError::MissingCollaborator("camera"))?;
        let feature_stage = self
            .feature_stage
            .ok_or(SlamError::MissingCollaborator("feature stage"))?;
        let pose_solver = self
            .pose_solver
            .ok_or(SlamError::MissingCollaborator("pose solver"))?;
        let fusion = self
            .fusion
            .unwrap_or_else(|| Box::new(WeightedMeanFusion::default()));

        if feature_stage.image_rows() != camera.rows || feature_stage.image_cols() != camera.cols {
            return Err(SlamError::InvalidConfig(format!(
                "feature stage image {}x{} does not match camera {}x{}",
                feature_stage.image_rows(),
                feature_stage.image_cols(),
                camera.rows,
                camera.cols
            )));
        }

        Ok(Tracker {
            config: self.config,
            camera,
            feature_stage,
            pose_solver,
            fusion,
            state: TrackingState::Localizing,
            previous_state: TrackingState::Localizing,
            motion_model: MotionModel::new(),
            stats: TrackerStats::default(),
        })
    }
}

/// Frame-sequential tracker.
pub struct Tracker {
    config: TrackerConfig,
    camera: Camera,
    feature_stage: Box<dyn FeatureStage>,
    pose_solver: Box<dyn PoseSolver>,
    fusion: Box<dyn LandmarkFusion>,

    state: TrackingState,
    /// State of the previous cycle; selects the pixel threshold.
    previous_state: TrackingState,
    motion_model: MotionModel,
    stats: TrackerStats,
}

impl Tracker {
    pub fn builder() -> TrackerBuilder {
        TrackerBuilder::new()
    }

    pub fn state(&self) -> TrackingState {
        self.state
    }

    pub fn previous_state(&self) -> TrackingState {
        self.previous_state
    }

    /// Current motion estimate, previous robot -> current robot.
    pub fn motion(&self) -> SE3 {
        self.motion_model.motion()
    }

    pub fn stats(&self) -> &TrackerStats {
        &self.stats
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    /// Back to Localizing with zero motion.
    pub fn reset(&mut self) {
        self.state = TrackingState::Localizing;
        self.previous_state = TrackingState::Localizing;
        self.motion_model.reset();
    }

    /// Active correspondence parameters for the next search.
    pub fn search_parameters(&self) -> SearchParameters {
        let pixel_distance_threshold = match self.previous_state {
            TrackingState::Localizing => self.config.pixel_distance_tracking_threshold_maximum,
            TrackingState::Tracking => self.config.pixel_distance_tracking_threshold_minimum,
        };
        SearchParameters {
            vicinity_range: self.config.range_point_tracking,
            pixel_distance_threshold,
            matching_thresholds: self
                .feature_stage
                .matching_thresholds()
                .unwrap_or_else(|| self.config.matching_thresholds()),
            maximum_flow_pixels_squared: self.config.maximum_flow_pixels_squared,
        }
    }

    /// Process one frame taken at `timestamp`.
    ///
    /// `odometry` is the absolute robot pose from an external source, if any;
    /// its delta since the previous call replaces the constant velocity prior.
    pub fn compute(&mut self, map: &mut WorldMap, timestamp: f64, odometry: Option<&SE3>) -> Result<TrackingResult> {
        let robot_to_world_before = map.robot_to_world();
        let motion_model_before = self.motion_model.clone();

        let motion_prior = self.motion_model.prior(odometry);
        if map.current_frame_id().is_some() {
            map.set_robot_to_world(map.robot_to_world() * motion_prior);
        }

        let frame_id = map.create_frame(timestamp, map.robot_to_world());
        let previous_id = map.previous_frame_id();
        let computed = self.feature_stage.compute(map.try_frame(frame_id)?);
        let mut grid = match computed {
            Ok(grid) => grid,
            Err(error) => {
                tracing::warn!("{}: feature stage failed, discarding frame: {}", frame_id, error);
                map.discard_frame(frame_id, robot_to_world_before)?;
                self.motion_model = motion_model_before;
                return Err(error);
            }
        };
        map.reset_tracked_landmarks();

        let mut result = TrackingResult::new(frame_id, self.state, map.robot_to_world());
        result.potential_points = grid.len();

        let parameters = self.search_parameters();
        let correspondence = match previous_id {
            Some(previous_id) => CorrespondenceSearch::new(&self.camera, parameters)
                .track(map.frame_pair_mut(previous_id, frame_id)?, &mut grid),
            None => CorrespondenceResult::default(),
        };
        result.tracked_points = correspondence.tracked_points;
        result.tracked_landmarks_close = correspondence.tracked_landmarks_close;
        result.tracked_landmarks_far = correspondence.tracked_landmarks_far;
        result.lost_points = correspondence.lost_points.len();

        let completed = match (self.state, previous_id) {
            (TrackingState::Tracking, Some(previous_id)) => self.track(
                map,
                frame_id,
                previous_id,
                &correspondence,
                parameters,
                &mut grid,
                &mut result,
            )?,
            _ => {
                self.localize(map, frame_id, previous_id, &mut result)?;
                true
            }
        };

        let frame = map.try_frame_mut(frame_id)?;
        if completed {
            let robot_to_world = frame.robot_to_world;
            result.new_points = admit_new_points(&mut frame.points, &mut grid, &robot_to_world);
            frame.status = self.state.into();
            debug_assert!(frame.has_unique_cells(), "frame {} holds duplicate candidates", frame_id);
        }

        result.state = self.state;
        result.robot_to_world = frame.robot_to_world;
        if completed {
            map.accumulate_window(frame_id)?;
        }
        self.stats.record(&result);

        tracing::debug!(
            "{} {}: tracked {} (close {}, far {}), inliers {}, new {}, landmarks +{}",
            frame_id,
            self.state,
            result.tracked_points,
            result.tracked_landmarks_close,
            result.tracked_landmarks_far,
            result.inliers,
            result.new_points,
            result.landmarks.created
        );
        Ok(result)
    }

    /// Localizing: refine on framepoints only and switch to Tracking once
    /// enough tracks matured.
    fn localize(
        &mut self,
        map: &mut WorldMap,
        frame_id: FrameId,
        previous_id: Option<FrameId>,
        result: &mut TrackingResult,
    ) -> Result<()> {
        let minimum_landmarks = self.config.minimum_number_of_landmarks_to_track;
        let minimum_track_length = self.config.minimum_track_length_for_landmark_creation;

        if let Some(previous_id) = previous_id {
            let solution = self.refine(map, frame_id, previous_id, 1.0)?;
            Self::record_solution(&solution, result);

            if solution.inliers > 2 * minimum_landmarks {
                let previous_pose = map.try_frame(previous_id)?.robot_to_world;
                let pose = self.accept_refinement(&previous_pose, &solution.robot_to_world, result);
                map.try_frame_mut(frame_id)?.robot_to_world = pose;
                map.set_robot_to_world(pose);
            }
        }

        let mature_points = map.try_frame(frame_id)?.count_points(minimum_track_length);
        if mature_points > minimum_landmarks {
            result.landmarks = map.update_landmarks(frame_id, minimum_track_length, self.fusion.as_ref())?;
            self.previous_state = self.state;
            self.state = TrackingState::Tracking;
            tracing::info!(
                "{}: switching to {} with {} mature tracks ({} landmarks created)",
                frame_id,
                self.state,
                mature_points,
                result.landmarks.created
            );
        } else {
            map.try_frame_mut(frame_id)?.update_world_coordinates();
        }
        Ok(())
    }

    /// Tracking: refine with landmark-weighted residuals, then prune,
    /// recover and fuse. Returns `false` when the track was lost.
    #[allow(clippy::too_many_arguments)]
    fn track(
        &mut self,
        map: &mut WorldMap,
        frame_id: FrameId,
        previous_id: FrameId,
        correspondence: &CorrespondenceResult,
        parameters: SearchParameters,
        grid: &mut CandidateGrid,
        result: &mut TrackingResult,
    ) -> Result<bool> {
        let weight = framepoint_weight(correspondence);
        let mut solution = self.refine(map, frame_id, previous_id, weight)?;
        Self::record_solution(&solution, result);

        let previous_pose = map.try_frame(previous_id)?.robot_to_world;

        if solution.inliers < self.config.minimum_number_of_landmarks_to_track {
            tracing::warn!(
                "{}: lost track with {} inliers ({} outliers), back to {}",
                frame_id,
                solution.inliers,
                solution.outliers,
                TrackingState::Localizing
            );
            self.state = TrackingState::Localizing;
            self.previous_state = TrackingState::Localizing;
            self.motion_model.reset();

            let frame = map.try_frame_mut(frame_id)?;
            frame.status = FrameStatus::Localizing;
            frame.clear_points();
            frame.robot_to_world = previous_pose;
            grid.clear();

            map.reset_tracked_landmarks();
            map.reset_window();
            map.set_robot_to_world(previous_pose);
            result.track_lost = true;
            return Ok(false);
        }

        let pose = self.accept_refinement(&previous_pose, &solution.robot_to_world, result);
        {
            let frame = map.try_frame_mut(frame_id)?;
            frame.robot_to_world = pose;
            solution.residuals.resize(frame.points.len(), Residual::Skipped);
            result.pruned_points = prune_points(&mut frame.points, &mut solution.residuals);
        }

        if self.config.enable_point_recovery && !correspondence.lost_points.is_empty() {
            result.recovered_points = CorrespondenceSearch::new(&self.camera, parameters).recover(
                &correspondence.lost_points,
                map.frame_pair_mut(previous_id, frame_id)?,
                grid,
            );
        }

        map.set_robot_to_world(pose);
        result.landmarks = map.update_landmarks(
            frame_id,
            self.config.minimum_track_length_for_landmark_creation,
            self.fusion.as_ref(),
        )?;
        self.previous_state = self.state;
        self.state = TrackingState::Tracking;
        Ok(true)
    }

    fn refine(&mut self, map: &WorldMap, frame_id: FrameId, previous_id: FrameId, weight: f64) -> Result<PoseSolution> {
        let frame = map.try_frame(frame_id)?;
        let problem = PoseProblem {
            frame,
            previous: map.try_frame(previous_id)?,
            landmarks: map.landmark_map(),
            initial_robot_to_world: frame.robot_to_world,
            weight_framepoint: weight,
        };
        Ok(self.pose_solver.solve(&problem))
    }

    /// Apply the significance rule to a refined pose.
    ///
    /// Returns the pose to keep: the refined one if the motion from the
    /// previous frame is significant, otherwise the previous pose with the
    /// motion estimate reset to identity.
    fn accept_refinement(&mut self, previous_pose: &SE3, refined: &SE3, result: &mut TrackingResult) -> SE3 {
        let motion = previous_pose.inverse() * *refined;
        if is_significant(
            &motion,
            self.config.minimum_delta_angular_for_movement,
            self.config.minimum_delta_translational_for_movement,
        ) {
            self.motion_model.set(motion);
            *refined
        } else {
            self.motion_model.reset();
            result.pose_retained = true;
            *previous_pose
        }
    }

    fn record_solution(solution: &PoseSolution, result: &mut TrackingResult) {
        result.inliers = solution.inliers;
        result.outliers = solution.outliers;
        result.average_error = solution.average_error();
    }
}
