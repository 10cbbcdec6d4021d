//! Error types for the tracking core.
//!
//! Track loss and insignificant motion are not errors: they are modeled
//! transitions of the tracker. The variants here cover conditions that can be
//! reached from external input (wiring, configuration, collaborators).

use thiserror::Error;

use crate::map::{FrameId, LandmarkId, LocalMapId};

#[derive(Error, Debug)]
pub enum SlamError {
    #[error("Missing collaborator: {0}")]
    MissingCollaborator(&'static str),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unknown frame {0}")]
    UnknownFrame(FrameId),

    #[error("Unknown landmark {0}")]
    UnknownLandmark(LandmarkId),

    #[error("Unknown local map {0}")]
    UnknownLocalMap(LocalMapId),

    #[error("Feature stage failed: {0}")]
    FeatureStage(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, SlamError>;
