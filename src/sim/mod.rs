//! Synthetic data for demos and end-to-end tests.

pub mod feature_stage;
pub mod scene;

pub use feature_stage::SyntheticFeatureStage;
pub use scene::{SceneConfig, ScenePoint, SyntheticScene};
