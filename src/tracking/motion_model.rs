//! Motion prior for pose prediction.

use crate::geometry::SE3;

/// Constant velocity motion model with optional odometry override.
///
/// Holds the motion from the previous to the current robot frame. When an
/// absolute odometry pose is available the motion is replaced by the
/// odometry delta since the last call.
#[derive(Debug, Clone)]
pub struct MotionModel {
    /// Motion previous robot -> current robot.
    motion: SE3,
    /// Last absolute odometry pose.
    previous_odometry: Option<SE3>,
}

impl MotionModel {
    pub fn new() -> Self {
        Self {
            motion: SE3::identity(),
            previous_odometry: None,
        }
    }

    /// Motion prior for the next frame.
    ///
    /// With odometry the prior is the delta since the previous odometry pose
    /// (identity on the first one); without it the last motion estimate.
    pub fn prior(&mut self, odometry: Option<&SE3>) -> SE3 {
        if let Some(odometry) = odometry {
            let previous = self.previous_odometry.unwrap_or(*odometry);
            self.motion = previous.inverse() * *odometry;
            self.previous_odometry = Some(*odometry);
        }
        self.motion
    }

    pub fn motion(&self) -> SE3 {
        self.motion
    }

    pub fn set(&mut self, motion: SE3) {
        self.motion = motion;
    }

    /// Zero motion. The odometry reference is kept.
    pub fn reset(&mut self) {
        self.motion = SE3::identity();
    }
}

impl Default for MotionModel {
    fn default() -> Self {
        Self::new()
    }
}

/// Whether a motion is large enough to replace the previous pose.
pub fn is_significant(motion: &SE3, angular_threshold: f64, translational_threshold: f64) -> bool {
    motion.rotation_angle() > angular_threshold || motion.translation_norm() > translational_threshold
}
