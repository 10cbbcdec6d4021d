//! SLAM System - main entry point.
//!
//! The `SlamSystem` owns the world map, the tracker and the loop detector,
//! and runs them frame by frame on the calling thread.

use tracing::{debug, info};

use crate::config::SlamConfig;
use crate::error::Result;
use crate::geometry::{Camera, SE3};
use crate::loop_closing::{LoopCandidate, LoopDetector};
use crate::map::{LocalMapId, WeightedMeanFusion, WorldMap};
use crate::optimizer::GaussNewtonPoseSolver;
use crate::tracking::{FeatureStage, Tracker, TrackerStats, TrackingResult};

/// Everything one call to [`SlamSystem::process_frame`] produced.
#[derive(Debug, Clone)]
pub struct FrameOutput {
    pub tracking: TrackingResult,
    /// Local map closed after this frame.
    pub local_map: Option<LocalMapId>,
    /// Loop closed by that local map.
    pub loop_closure: Option<LoopCandidate>,
    /// Landmarks removed by the purge that follows a new local map.
    pub purged_landmarks: usize,
}

pub struct SlamSystem {
    map: WorldMap,
    tracker: Tracker,
    loop_detector: LoopDetector,
    loop_closures: Vec<LoopCandidate>,
}

impl SlamSystem {
    /// Create a system with the reference pose solver and landmark fusion.
    pub fn new(config: SlamConfig, camera: Camera, feature_stage: impl FeatureStage + 'static) -> Result<Self> {
        config.validate()?;
        let tracker = Tracker::builder()
            .config(config.tracker)
            .camera(camera)
            .feature_stage(feature_stage)
            .pose_solver(GaussNewtonPoseSolver::new(config.pose_solver))
            .landmark_fusion(WeightedMeanFusion::new(config.landmark_fusion))
            .build()?;

        Ok(Self {
            map: WorldMap::new(config.world_map),
            tracker,
            loop_detector: LoopDetector::new(config.loop_closure),
            loop_closures: Vec::new(),
        })
    }

    /// Process the frame taken at `timestamp`.
    ///
    /// `odometry` is an absolute pose from an external source, if available.
    pub fn process_frame(&mut self, timestamp: f64, odometry: Option<&SE3>) -> Result<FrameOutput> {
        let tracking = self.tracker.compute(&mut self.map, timestamp, odometry)?;
        let mut output = FrameOutput {
            tracking,
            local_map: None,
            loop_closure: None,
            purged_landmarks: 0,
        };

        if !output.tracking.state.is_tracking() || output.tracking.track_lost {
            return Ok(output);
        }

        let Some(local_map) = self.map.create_local_map() else {
            return Ok(output);
        };
        output.local_map = Some(local_map);

        if let Some(candidate) = self.loop_detector.detect(&self.map, local_map)? {
            self.map
                .close_local_maps(candidate.query, candidate.reference, candidate.query_to_reference)?;
            self.loop_closures.push(candidate.clone());
            output.loop_closure = Some(candidate);
        }

        output.purged_landmarks = self.map.purify_landmarks();
        debug!(
            "{}: purged {} landmarks, {} remain",
            local_map,
            output.purged_landmarks,
            self.map.num_landmarks()
        );
        Ok(output)
    }

    pub fn map(&self) -> &WorldMap {
        &self.map
    }

    pub fn tracker(&self) -> &Tracker {
        &self.tracker
    }

    pub fn stats(&self) -> &TrackerStats {
        self.tracker.stats()
    }

    pub fn loop_closures(&self) -> &[LoopCandidate] {
        &self.loop_closures
    }

    /// Estimated trajectory as (timestamp, pose) pairs.
    pub fn trajectory(&self) -> Vec<(f64, SE3)> {
        self.map.trajectory()
    }

    /// Drop all map content and restart tracking.
    pub fn reset(&mut self) {
        info!("Resetting system after {} frames", self.map.num_frames());
        self.map.clear();
        self.tracker.reset();
        self.loop_closures.clear();
    }
}
