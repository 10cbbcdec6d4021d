//! Landmark - a persistent 3D point fused from a track of observations.
//!
//! Landmarks are created once a track reaches the minimum track length and
//! are refined every frame they stay tracked. Refinement goes through the
//! [`LandmarkFusion`] trait so the estimator can be swapped.

use nalgebra::Vector3;
use serde::Deserialize;

use super::frame_point::FramePoint;
use super::types::{FramePointRef, LandmarkId};

/// Minimum depth used when weighting observations by inverse depth.
const MIN_FUSION_DEPTH: f64 = 1e-3;

/// A fused 3D landmark.
#[derive(Debug, Clone)]
pub struct Landmark {
    pub id: LandmarkId,

    /// Fused world coordinates.
    pub coordinates: Vector3<f64>,

    /// Set once enough observations agreed on the coordinates.
    pub are_coordinates_validated: bool,

    /// Whether the latest observation was within the near-depth band.
    pub is_near: bool,

    /// Recomputed every frame by the tracker.
    pub is_currently_tracked: bool,

    /// Point that triggered the landmark's creation.
    pub origin: FramePointRef,

    /// Accepted observations.
    pub number_of_updates: usize,

    /// Observations rejected by the fusion gate.
    pub number_of_rejections: usize,

    /// Rejections since the last accepted observation.
    pub consecutive_rejections: usize,

    /// Sum of fusion weights of accepted observations.
    pub total_weight: f64,
}

impl Landmark {
    /// Create a landmark at `coordinates` with no accepted observations.
    pub fn new(id: LandmarkId, origin: FramePointRef, coordinates: Vector3<f64>) -> Self {
        Self {
            id,
            coordinates,
            are_coordinates_validated: false,
            is_near: false,
            is_currently_tracked: false,
            origin,
            number_of_updates: 0,
            number_of_rejections: 0,
            consecutive_rejections: 0,
            total_weight: 0.0,
        }
    }

    /// Projection target for correspondence search.
    ///
    /// Only validated coordinates are trusted; otherwise the observing point's
    /// own world coordinates are used.
    pub fn prediction_target(&self, fallback: &Vector3<f64>) -> Vector3<f64> {
        if self.are_coordinates_validated {
            self.coordinates
        } else {
            *fallback
        }
    }
}

/// Result of fusing one observation into a landmark.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionOutcome {
    /// Observation merged into the estimate.
    Accepted,
    /// Observation too far from the estimate; estimate unchanged.
    Rejected,
    /// Estimate re-initialised from the observation after repeated rejections.
    Reset,
}

/// Strategy for refining a landmark position from a new observation.
pub trait LandmarkFusion {
    fn fuse(&self, landmark: &mut Landmark, observation: &FramePoint) -> FusionOutcome;
}

/// Configuration for [`WeightedMeanFusion`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LandmarkFusionConfig {
    /// Squared distance (m²) beyond which an observation is rejected.
    pub maximum_error_squared: f64,

    /// Accepted observations needed before coordinates count as validated.
    pub minimum_updates_for_validation: usize,

    /// Consecutive rejections after which an unvalidated estimate is reset.
    pub maximum_consecutive_rejections: usize,
}

impl Default for LandmarkFusionConfig {
    fn default() -> Self {
        Self {
            maximum_error_squared: 0.25,
            minimum_updates_for_validation: 3,
            maximum_consecutive_rejections: 5,
        }
    }
}

/// Running mean of world coordinates weighted by inverse depth.
///
/// Near observations are more accurate for stereo triangulation and so
/// dominate the estimate.
#[derive(Debug, Clone, Default)]
pub struct WeightedMeanFusion {
    config: LandmarkFusionConfig,
}

impl WeightedMeanFusion {
    pub fn new(config: LandmarkFusionConfig) -> Self {
        Self { config }
    }

    fn accept(&self, landmark: &mut Landmark, position: &Vector3<f64>, weight: f64) {
        let total = landmark.total_weight + weight;
        landmark.coordinates = (landmark.coordinates * landmark.total_weight + position * weight) / total;
        landmark.total_weight = total;
        landmark.number_of_updates += 1;
        landmark.consecutive_rejections = 0;
        if landmark.number_of_updates >= self.config.minimum_updates_for_validation {
            landmark.are_coordinates_validated = true;
        }
    }
}

impl LandmarkFusion for WeightedMeanFusion {
    fn fuse(&self, landmark: &mut Landmark, observation: &FramePoint) -> FusionOutcome {
        let position = observation.world_coordinates;
        let weight = 1.0 / observation.depth.max(MIN_FUSION_DEPTH);

        if landmark.number_of_updates == 0 {
            landmark.coordinates = position;
            landmark.total_weight = 0.0;
            self.accept(landmark, &position, weight);
            return FusionOutcome::Accepted;
        }

        let error_squared = (position - landmark.coordinates).norm_squared();
        if error_squared <= self.config.maximum_error_squared {
            self.accept(landmark, &position, weight);
            return FusionOutcome::Accepted;
        }

        landmark.number_of_rejections += 1;
        landmark.consecutive_rejections += 1;

        if !landmark.are_coordinates_validated
            && landmark.consecutive_rejections >= self.config.maximum_consecutive_rejections
        {
            landmark.coordinates = position;
            landmark.total_weight = 0.0;
            landmark.number_of_updates = 0;
            self.accept(landmark, &position, weight);
            return FusionOutcome::Reset;
        }

        FusionOutcome::Rejected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::frame_point::{Descriptor, GridCell};
    use crate::map::types::FrameId;
    use approx::assert_relative_eq;
    use nalgebra::Vector2;

    fn observation(world: Vector3<f64>, depth: f64) -> FramePoint {
        let mut p = FramePoint::new(
            FrameId::new(0),
            GridCell::new(0, 0),
            Vector2::zeros(),
            Descriptor::zeros(),
            world,
            depth,
            depth < 5.0,
        );
        p.world_coordinates = world;
        p
    }

    fn landmark() -> Landmark {
        Landmark::new(
            LandmarkId::new(0),
            FramePointRef::new(FrameId::new(0), 0),
            Vector3::zeros(),
        )
    }

    #[test]
    fn test_first_observation_initialises() {
        let fusion = WeightedMeanFusion::default();
        let mut lm = landmark();

        let outcome = fusion.fuse(&mut lm, &observation(Vector3::new(1.0, 2.0, 3.0), 3.0));
        assert_eq!(outcome, FusionOutcome::Accepted);
        assert_relative_eq!(lm.coordinates, Vector3::new(1.0, 2.0, 3.0), epsilon = 1e-12);
        assert!(!lm.are_coordinates_validated);
    }

    #[test]
    fn test_weighted_mean_prefers_near_observations() {
        let fusion = WeightedMeanFusion::default();
        let mut lm = landmark();

        fusion.fuse(&mut lm, &observation(Vector3::new(0.0, 0.0, 2.0), 1.0));
        fusion.fuse(&mut lm, &observation(Vector3::new(0.0, 0.0, 2.3), 3.0));

        // weights 1 and 1/3
        assert_relative_eq!(lm.coordinates.z, (2.0 + 2.3 / 3.0) / (4.0 / 3.0), epsilon = 1e-12);
    }

    #[test]
    fn test_single_outlier_does_not_overwrite() {
        let fusion = WeightedMeanFusion::default();
        let mut lm = landmark();
        let inlier = Vector3::new(1.0, 1.0, 4.0);

        for _ in 0..3 {
            fusion.fuse(&mut lm, &observation(inlier, 4.0));
        }
        assert!(lm.are_coordinates_validated);

        let outcome = fusion.fuse(&mut lm, &observation(Vector3::new(9.0, 9.0, 9.0), 9.0));
        assert_eq!(outcome, FusionOutcome::Rejected);
        assert_relative_eq!(lm.coordinates, inlier, epsilon = 1e-12);
        assert_eq!(lm.number_of_rejections, 1);
    }

    #[test]
    fn test_unvalidated_estimate_resets_after_repeated_rejections() {
        let config = LandmarkFusionConfig {
            maximum_consecutive_rejections: 2,
            ..Default::default()
        };
        let fusion = WeightedMeanFusion::new(config);
        let mut lm = landmark();
        let moved = Vector3::new(5.0, 0.0, 5.0);

        fusion.fuse(&mut lm, &observation(Vector3::zeros(), 2.0));
        assert_eq!(fusion.fuse(&mut lm, &observation(moved, 2.0)), FusionOutcome::Rejected);
        assert_eq!(fusion.fuse(&mut lm, &observation(moved, 2.0)), FusionOutcome::Reset);
        assert_relative_eq!(lm.coordinates, moved, epsilon = 1e-12);
        assert_eq!(lm.number_of_updates, 1);
    }

    #[test]
    fn test_prediction_target_uses_validated_coordinates_only() {
        let mut lm = landmark();
        lm.coordinates = Vector3::new(1.0, 0.0, 0.0);
        let fallback = Vector3::new(0.0, 1.0, 0.0);

        assert_eq!(lm.prediction_target(&fallback), fallback);
        lm.are_coordinates_validated = true;
        assert_eq!(lm.prediction_target(&fallback), lm.coordinates);
    }
}
