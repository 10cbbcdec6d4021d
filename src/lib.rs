pub mod config;
pub mod error;
pub mod geometry;
pub mod io;
pub mod loop_closing;
pub mod map;
pub mod optimizer;
pub mod sim;
pub mod system;
pub mod tracking;

pub use config::SlamConfig;
pub use error::{Result, SlamError};
