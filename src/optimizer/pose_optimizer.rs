//! Gauss-Newton pose refinement over 3D point residuals.
//!
//! Every tracked point contributes the residual between its measured robot
//! coordinates and its reference position (validated landmark coordinates,
//! or the previous observation's world coordinates) mapped into the robot
//! frame by the current estimate. The world-to-robot transform is updated by
//! left perturbation with the Jacobian `[-[q]x, I]`, robustified with a Huber
//! kernel.

use nalgebra::{Matrix3, Matrix6, SMatrix, Vector3, Vector6};
use serde::Deserialize;
use tracing::debug;

use crate::geometry::{so3, SE3};
use crate::map::FramePoint;
use crate::tracking::{PoseProblem, PoseSolution, PoseSolver, Residual};

/// Below this many measurements the pose is not refined.
const MIN_MEASUREMENTS: usize = 3;

/// Configuration for [`GaussNewtonPoseSolver`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoseSolverConfig {
    pub maximum_iterations: usize,

    /// Stop once the total error changes by less than this.
    pub minimum_error_delta: f64,

    /// Squared residual (m²) separating inliers from outliers; also the
    /// Huber kernel width.
    pub maximum_error_kernel: f64,

    /// Points deeper than this (m) are not evaluated.
    pub maximum_depth_far: f64,

    /// Diagonal damping added to the normal equations.
    pub damping: f64,
}

impl Default for PoseSolverConfig {
    fn default() -> Self {
        Self {
            maximum_iterations: 20,
            minimum_error_delta: 1e-9,
            maximum_error_kernel: 0.25,
            maximum_depth_far: 30.0,
            damping: 1e-9,
        }
    }
}

/// One residual term.
struct Measurement {
    index: usize,
    /// Reference position in world coordinates.
    reference: Vector3<f64>,
    /// Measured position in robot coordinates.
    measurement: Vector3<f64>,
    weight: f64,
}

/// Reference pose solver.
#[derive(Debug, Clone, Default)]
pub struct GaussNewtonPoseSolver {
    config: PoseSolverConfig,
}

impl GaussNewtonPoseSolver {
    pub fn new(config: PoseSolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PoseSolverConfig {
        &self.config
    }

    fn measurement(&self, index: usize, point: &FramePoint, problem: &PoseProblem<'_>) -> Option<Measurement> {
        if point.depth <= 0.0 || point.depth > self.config.maximum_depth_far {
            return None;
        }

        let validated = point
            .landmark
            .and_then(|id| problem.landmarks.get(&id))
            .filter(|landmark| landmark.are_coordinates_validated);
        if let Some(landmark) = validated {
            return Some(Measurement {
                index,
                reference: landmark.coordinates,
                measurement: point.robot_coordinates,
                weight: 1.0,
            });
        }

        let previous = point.previous?;
        if previous.frame != problem.previous.id {
            return None;
        }
        let previous_point = problem.previous.points.get(previous.index)?;
        Some(Measurement {
            index,
            reference: previous_point.world_coordinates,
            measurement: point.robot_coordinates,
            weight: problem.weight_framepoint,
        })
    }

    fn robust_weight(&self, error_squared: f64) -> f64 {
        if error_squared > self.config.maximum_error_kernel {
            (self.config.maximum_error_kernel / error_squared).sqrt()
        } else {
            1.0
        }
    }
}

impl PoseSolver for GaussNewtonPoseSolver {
    fn solve(&mut self, problem: &PoseProblem<'_>) -> PoseSolution {
        let measurements: Vec<Measurement> = problem
            .frame
            .points
            .iter()
            .enumerate()
            .filter_map(|(index, point)| self.measurement(index, point, problem))
            .collect();

        let mut world_to_robot = problem.initial_robot_to_world.inverse();
        let mut iterations = 0;

        if measurements.len() >= MIN_MEASUREMENTS {
            let mut previous_error = f64::MAX;
            for _ in 0..self.config.maximum_iterations {
                iterations += 1;
                let mut hessian = Matrix6::<f64>::zeros();
                let mut gradient = Vector6::<f64>::zeros();
                let mut total_error = 0.0;

                for m in &measurements {
                    let predicted = world_to_robot.transform_point(&m.reference);
                    let error = predicted - m.measurement;
                    let error_squared = error.norm_squared();
                    let weight = m.weight * self.robust_weight(error_squared);

                    let mut jacobian = SMatrix::<f64, 3, 6>::zeros();
                    jacobian
                        .fixed_view_mut::<3, 3>(0, 0)
                        .copy_from(&(-so3::skew(&predicted)));
                    jacobian
                        .fixed_view_mut::<3, 3>(0, 3)
                        .copy_from(&Matrix3::identity());

                    hessian += jacobian.transpose() * jacobian * weight;
                    gradient += jacobian.transpose() * error * weight;
                    total_error += error_squared;
                }

                hessian += Matrix6::identity() * self.config.damping;
                let Some(delta) = hessian.cholesky().map(|c| c.solve(&(-gradient))) else {
                    break;
                };

                let rotation = so3::exp(&Vector3::new(delta[0], delta[1], delta[2]));
                let translation = Vector3::new(delta[3], delta[4], delta[5]);
                world_to_robot = SE3::new(rotation, translation) * world_to_robot;

                if (previous_error - total_error).abs() < self.config.minimum_error_delta {
                    break;
                }
                previous_error = total_error;
            }
        }

        let mut residuals = vec![Residual::Skipped; problem.frame.points.len()];
        let mut inliers = 0;
        let mut outliers = 0;
        let mut total_error = 0.0;
        for m in &measurements {
            let error = (world_to_robot.transform_point(&m.reference) - m.measurement).norm_squared();
            let inlier = error <= self.config.maximum_error_kernel;
            if inlier {
                inliers += 1;
                total_error += error;
            } else {
                outliers += 1;
            }
            residuals[m.index] = Residual::Evaluated { error, inlier };
        }

        debug!(
            "Pose refinement: {} iterations, {} inliers, {} outliers, {} measurements",
            iterations,
            inliers,
            outliers,
            measurements.len()
        );

        PoseSolution {
            robot_to_world: world_to_robot.inverse(),
            inliers,
            outliers,
            total_error,
            residuals,
        }
    }
}
