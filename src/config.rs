//! Aggregated configuration loaded from YAML.
//!
//! Every section is optional; missing keys fall back to the component
//! defaults.

use std::path::Path;

use serde::Deserialize;

use crate::error::{Result, SlamError};
use crate::loop_closing::LoopClosureConfig;
use crate::map::{LandmarkFusionConfig, WorldMapConfig};
use crate::optimizer::PoseSolverConfig;
use crate::tracking::TrackerConfig;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SlamConfig {
    pub tracker: TrackerConfig,
    pub world_map: WorldMapConfig,
    pub pose_solver: PoseSolverConfig,
    pub landmark_fusion: LandmarkFusionConfig,
    pub loop_closure: LoopClosureConfig,
}

impl SlamConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: SlamConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    pub fn validate(&self) -> Result<()> {
        self.tracker.validate()?;

        let world_map = &self.world_map;
        if world_map.minimum_distance_traveled_for_local_map < 0.0
            || world_map.minimum_degrees_rotated_for_local_map < 0.0
        {
            return Err(SlamError::InvalidConfig("local map thresholds must be non-negative".into()));
        }

        let solver = &self.pose_solver;
        if solver.maximum_iterations == 0 {
            return Err(SlamError::InvalidConfig("maximum_iterations must be positive".into()));
        }
        if solver.maximum_error_kernel <= 0.0 || solver.maximum_depth_far <= 0.0 {
            return Err(SlamError::InvalidConfig(
                "pose solver kernel and depth limit must be positive".into(),
            ));
        }

        let fusion = &self.landmark_fusion;
        if fusion.maximum_error_squared <= 0.0 {
            return Err(SlamError::InvalidConfig("maximum_error_squared must be positive".into()));
        }
        if fusion.minimum_updates_for_validation == 0 {
            return Err(SlamError::InvalidConfig(
                "minimum_updates_for_validation must be positive".into(),
            ));
        }

        let alignment = &self.loop_closure.alignment;
        if alignment.minimum_inliers < 3 || alignment.inlier_distance <= 0.0 {
            return Err(SlamError::InvalidConfig(
                "loop closure alignment needs at least 3 inliers and a positive distance".into(),
            ));
        }
        if !(0.0..1.0).contains(&alignment.probability) {
            return Err(SlamError::InvalidConfig("alignment probability must be in [0, 1)".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_defaults() {
        let config = SlamConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.tracker.minimum_number_of_landmarks_to_track, 5);
        assert_eq!(config.tracker.pixel_distance_tracking_threshold_minimum, 16);
        assert_eq!(config.tracker.pixel_distance_tracking_threshold_maximum, 49);
        assert_eq!(config.world_map.minimum_number_of_frames_for_local_map, 4);
    }

    #[test]
    fn test_partial_yaml() {
        let yaml = "
tracker:
  minimum_number_of_landmarks_to_track: 8
  matching_distance_tracking_region: 60
world_map:
  minimum_distance_traveled_for_local_map: 1.5
";
        let config = SlamConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.tracker.minimum_number_of_landmarks_to_track, 8);
        assert_eq!(config.tracker.matching_distance_tracking_point, 50);
        assert_eq!(config.tracker.matching_distance_tracking_region, 60);
        assert_relative_eq!(config.world_map.minimum_distance_traveled_for_local_map, 1.5);
        assert_relative_eq!(config.world_map.minimum_degrees_rotated_for_local_map, 0.5);
        assert_eq!(config.pose_solver.maximum_iterations, 20);
    }

    #[test]
    fn test_rejects_invalid_values() {
        let yaml = "
tracker:
  pixel_distance_tracking_threshold_minimum: 64
  pixel_distance_tracking_threshold_maximum: 16
";
        assert!(matches!(
            SlamConfig::from_yaml_str(yaml),
            Err(SlamError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_rejects_malformed_yaml() {
        assert!(matches!(
            SlamConfig::from_yaml_str("tracker: [1, 2"),
            Err(SlamError::ConfigParse(_))
        ));
    }
}
