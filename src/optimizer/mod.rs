//! Pose optimization.
//!
//! Implements Gauss-Newton refinement of the current frame pose against the
//! previous frame's points and validated landmarks.

pub mod pose_optimizer;

pub use pose_optimizer::{GaussNewtonPoseSolver, PoseSolverConfig};
