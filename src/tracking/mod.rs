//! Tracking: frame-to-frame correspondence search and the tracking state
//! machine.
//!
//! Per frame the tracker
//! - predicts the pose from odometry or a constant velocity prior
//! - links previous points to the feature stage's candidate grid
//! - refines the pose through the pose solver
//! - prunes outliers, recovers lost landmark points and fuses landmarks
//! - admits unmatched candidates as new tracks

pub mod candidate_grid;
pub mod correspondence;
pub mod feature_stage;
pub mod motion_model;
pub mod pose_solver;
pub mod pruning;
pub mod result;
pub mod state;
pub mod tracker;

pub use candidate_grid::CandidateGrid;
pub use correspondence::{CorrespondenceResult, CorrespondenceSearch, SearchParameters};
pub use feature_stage::{FeatureStage, MatchingThresholds};
pub use pose_solver::{PoseProblem, PoseSolution, PoseSolver, Residual};
pub use result::{TrackerStats, TrackingResult};
pub use state::TrackingState;
pub use tracker::{Tracker, TrackerBuilder, TrackerConfig};
