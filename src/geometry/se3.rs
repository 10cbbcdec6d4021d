//! Rigid-body transforms.
//!
//! Poses follow the `T_target_source` naming: a frame pose is stored as
//! `robot_to_world`, so `p_world = robot_to_world * p_robot`.

use std::ops::Mul;

use nalgebra::{Matrix3, Matrix4, Rotation3, UnitQuaternion, Vector3};

/// Rigid transform in 3D: rotation followed by translation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SE3 {
    pub rotation: UnitQuaternion<f64>,
    pub translation: Vector3<f64>,
}

impl SE3 {
    pub fn new(rotation: UnitQuaternion<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation: Vector3::zeros(),
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::identity(),
            translation,
        }
    }

    /// Build from an axis-angle (scaled axis) rotation and a translation.
    pub fn from_scaled_axis(axis_angle: Vector3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation: UnitQuaternion::from_scaled_axis(axis_angle),
            translation,
        }
    }

    /// Build from a w-first quaternion and a position.
    pub fn from_quaternion(qw: f64, qx: f64, qy: f64, qz: f64, translation: Vector3<f64>) -> Self {
        let rotation =
            UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(qw, qx, qy, qz));
        Self {
            rotation,
            translation,
        }
    }

    /// Build from a homogeneous 4x4 matrix. The rotation block is re-orthonormalized.
    pub fn from_matrix(mat: Matrix4<f64>) -> Self {
        let r: Matrix3<f64> = mat.fixed_view::<3, 3>(0, 0).into_owned();
        let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&r));
        let translation = Vector3::new(mat[(0, 3)], mat[(1, 3)], mat[(2, 3)]);
        Self {
            rotation,
            translation,
        }
    }

    pub fn to_matrix(&self) -> Matrix4<f64> {
        let mut mat = Matrix4::identity();
        mat.fixed_view_mut::<3, 3>(0, 0)
            .copy_from(self.rotation.to_rotation_matrix().matrix());
        mat.fixed_view_mut::<3, 1>(0, 3).copy_from(&self.translation);
        mat
    }

    pub fn inverse(&self) -> Self {
        let rotation = self.rotation.inverse();
        Self {
            rotation,
            translation: -(rotation * self.translation),
        }
    }

    /// `self * other`: apply `other` first, then `self`.
    pub fn compose(&self, other: &SE3) -> Self {
        Self {
            rotation: self.rotation * other.rotation,
            translation: self.rotation * other.translation + self.translation,
        }
    }

    pub fn transform_point(&self, point: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * point + self.translation
    }

    /// Rotation magnitude in radians (norm of the axis-angle vector).
    pub fn rotation_angle(&self) -> f64 {
        self.rotation.angle()
    }

    pub fn translation_norm(&self) -> f64 {
        self.translation.norm()
    }
}

impl Default for SE3 {
    fn default() -> Self {
        Self::identity()
    }
}

impl Mul for SE3 {
    type Output = SE3;

    fn mul(self, rhs: SE3) -> SE3 {
        self.compose(&rhs)
    }
}

impl Mul<&SE3> for &SE3 {
    type Output = SE3;

    fn mul(self, rhs: &SE3) -> SE3 {
        self.compose(rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn sample_pose() -> SE3 {
        SE3::from_scaled_axis(Vector3::new(0.1, -0.2, 0.3), Vector3::new(1.0, 2.0, 3.0))
    }

    #[test]
    fn test_inverse_composes_to_identity() {
        let pose = sample_pose();
        let product = pose.compose(&pose.inverse());

        assert_relative_eq!(product.translation, Vector3::zeros(), epsilon = 1e-12);
        assert_relative_eq!(product.rotation_angle(), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_compose_matches_matrix_product() {
        let a = sample_pose();
        let b = SE3::from_scaled_axis(Vector3::new(0.0, 0.4, 0.0), Vector3::new(-1.0, 0.5, 0.0));

        let composed = (a * b).to_matrix();
        let expected = a.to_matrix() * b.to_matrix();
        assert_relative_eq!(composed, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_conversion_keeps_pose() {
        let pose = sample_pose();
        let back = SE3::from_matrix(pose.to_matrix());

        assert_relative_eq!(back.translation, pose.translation, epsilon = 1e-12);
        assert_relative_eq!(back.rotation.angle_to(&pose.rotation), 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_rotation_angle_is_axis_angle_norm() {
        let pose = SE3::from_scaled_axis(Vector3::new(0.0, 0.0, 0.0005), Vector3::zeros());
        assert_relative_eq!(pose.rotation_angle(), 0.0005, epsilon = 1e-12);
    }
}
