//! Geometry utilities: SE3 transforms, SO(3) helpers, camera projection.

pub mod camera;
pub mod se3;
pub mod so3;

pub use camera::Camera;
pub use se3::SE3;
