//! Pose solver interface used by the tracker.

use std::collections::HashMap;

use crate::geometry::SE3;
use crate::map::{Frame, Landmark, LandmarkId};

/// Per-point outcome of a pose refinement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Residual {
    /// The point did not take part (no track, too far, no reference).
    Skipped,
    Evaluated { error: f64, inlier: bool },
}

impl Residual {
    pub fn is_evaluated(&self) -> bool {
        matches!(self, Self::Evaluated { .. })
    }

    pub fn is_inlier(&self) -> bool {
        matches!(self, Self::Evaluated { inlier: true, .. })
    }
}

/// Input of a pose refinement.
pub struct PoseProblem<'a> {
    /// Frame whose pose is refined; its points are the measurements.
    pub frame: &'a Frame,
    /// Frame the points were tracked from.
    pub previous: &'a Frame,
    pub landmarks: &'a HashMap<LandmarkId, Landmark>,
    pub initial_robot_to_world: SE3,
    /// Weight of points without a validated landmark, in [0, 1].
    pub weight_framepoint: f64,
}

/// Result of a pose refinement.
#[derive(Debug, Clone)]
pub struct PoseSolution {
    pub robot_to_world: SE3,
    pub inliers: usize,
    pub outliers: usize,
    pub total_error: f64,
    /// One entry per point of the frame, in point order.
    pub residuals: Vec<Residual>,
}

impl PoseSolution {
    /// Solution that keeps the initial pose and rejects nothing.
    pub fn unchanged(robot_to_world: SE3, num_points: usize) -> Self {
        Self {
            robot_to_world,
            inliers: 0,
            outliers: 0,
            total_error: 0.0,
            residuals: vec![Residual::Skipped; num_points],
        }
    }

    pub fn average_error(&self) -> f64 {
        if self.inliers == 0 {
            0.0
        } else {
            self.total_error / self.inliers as f64
        }
    }
}

/// Nonlinear refinement of a frame pose from its tracked points.
pub trait PoseSolver {
    fn solve(&mut self, problem: &PoseProblem<'_>) -> PoseSolution;
}
