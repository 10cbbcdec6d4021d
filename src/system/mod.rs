//! SLAM system orchestration.
//!
//! This module contains the top-level `SlamSystem` that drives tracking,
//! local map segmentation and loop closing for each incoming frame.

mod slam_system;

pub use slam_system::{FrameOutput, SlamSystem};
