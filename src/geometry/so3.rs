//! SO(3) helpers used by the pose solver.

use nalgebra::{Matrix3, UnitQuaternion, Vector3};

/// Below this angle the exponential map falls back to first order.
const SMALL_ANGLE_THRESHOLD: f64 = 1e-10;

/// Constructs the skew-symmetric matrix [v]× such that [v]× u = v × u.
#[inline]
#[rustfmt::skip]
pub fn skew(v: &Vector3<f64>) -> Matrix3<f64> {
    Matrix3::new(
        0.0, -v.z, v.y,
        v.z, 0.0, -v.x,
        -v.y, v.x, 0.0,
    )
}

/// Exponential map from a rotation vector to a unit quaternion.
pub fn exp(phi: &Vector3<f64>) -> UnitQuaternion<f64> {
    if phi.norm() < SMALL_ANGLE_THRESHOLD {
        return UnitQuaternion::identity();
    }
    UnitQuaternion::from_scaled_axis(*phi)
}

/// Logarithm map: rotation vector whose norm is the rotation angle.
pub fn log(rotation: &UnitQuaternion<f64>) -> Vector3<f64> {
    rotation.scaled_axis()
}
