pub mod odometry;

pub use odometry::{load_odometry, read_odometry, OdometryEntry};
