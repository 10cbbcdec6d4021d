//! Pinhole camera model used for point prediction.

use nalgebra::{Matrix3, Vector2, Vector3};

use super::SE3;

/// Minimum depth (camera z) for a projection to be considered valid.
const MIN_PROJECTION_DEPTH: f64 = 1e-6;

/// Left camera of the rig: intrinsics, image size and mounting.
#[derive(Debug, Clone, Copy)]
pub struct Camera {
    pub rows: usize,
    pub cols: usize,
    /// Intrinsic matrix K mapping camera coordinates to homogeneous pixels.
    pub projection: Matrix3<f64>,
    /// Transform from the robot frame to the camera frame.
    pub robot_to_camera: SE3,
}

impl Camera {
    pub fn new(rows: usize, cols: usize, projection: Matrix3<f64>, robot_to_camera: SE3) -> Self {
        Self {
            rows,
            cols,
            projection,
            robot_to_camera,
        }
    }

    /// Camera from [fx, fy, cx, cy] with the camera mounted at the robot origin.
    pub fn from_intrinsics(rows: usize, cols: usize, fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self::new(
            rows,
            cols,
            Matrix3::new(fx, 0.0, cx, 0.0, fy, cy, 0.0, 0.0, 1.0),
            SE3::identity(),
        )
    }

    /// World-to-camera transform for a robot pose.
    pub fn world_to_camera(&self, robot_to_world: &SE3) -> SE3 {
        self.robot_to_camera.compose(&robot_to_world.inverse())
    }

    /// Project a camera-frame point to pixel coordinates (x = column, y = row).
    ///
    /// Returns `None` for points behind the camera or outside the image.
    pub fn project(&self, point_in_camera: &Vector3<f64>) -> Option<Vector2<f64>> {
        if point_in_camera.z <= MIN_PROJECTION_DEPTH {
            return None;
        }
        let homogeneous = self.projection * point_in_camera;
        let pixel = Vector2::new(homogeneous.x / homogeneous.z, homogeneous.y / homogeneous.z);
        if self.contains(&pixel) {
            Some(pixel)
        } else {
            None
        }
    }

    /// Project a world point as seen from `world_to_camera`.
    pub fn project_world(
        &self,
        world_to_camera: &SE3,
        point_in_world: &Vector3<f64>,
    ) -> Option<Vector2<f64>> {
        self.project(&world_to_camera.transform_point(point_in_world))
    }

    pub fn contains(&self, pixel: &Vector2<f64>) -> bool {
        pixel.x >= 0.0
            && pixel.x <= self.cols as f64
            && pixel.y >= 0.0
            && pixel.y <= self.rows as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn camera() -> Camera {
        Camera::from_intrinsics(480, 640, 500.0, 500.0, 320.0, 240.0)
    }

    #[test]
    fn test_project_optical_axis_hits_principal_point() {
        let pixel = camera().project(&Vector3::new(0.0, 0.0, 4.0)).unwrap();
        assert_relative_eq!(pixel, Vector2::new(320.0, 240.0), epsilon = 1e-12);
    }

    #[test]
    fn test_project_rejects_points_behind_camera() {
        assert!(camera().project(&Vector3::new(0.0, 0.0, -1.0)).is_none());
    }

    #[test]
    fn test_project_rejects_out_of_view() {
        // x = 500 * 2 / 1 + 320 = 1320 > 640
        assert!(camera().project(&Vector3::new(2.0, 0.0, 1.0)).is_none());
    }

    #[test]
    fn test_project_world_uses_robot_pose() {
        let cam = camera();
        let robot_to_world = SE3::from_translation(Vector3::new(0.0, 0.0, -1.0));
        let world_to_camera = cam.world_to_camera(&robot_to_world);

        let pixel = cam
            .project_world(&world_to_camera, &Vector3::new(0.5, 0.0, 1.0))
            .unwrap();
        assert_relative_eq!(pixel.x, 320.0 + 500.0 * 0.25, epsilon = 1e-9);
    }
}
