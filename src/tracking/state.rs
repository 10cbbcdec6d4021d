//! Tracking state machine states.

use crate::map::FrameStatus;

/// State of the tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TrackingState {
    /// No reliable landmarks yet: initial state and the state after a loss.
    #[default]
    Localizing,
    /// Enough landmarks are tracked to refine the pose against them.
    Tracking,
}

impl TrackingState {
    pub fn is_tracking(self) -> bool {
        self == Self::Tracking
    }
}

impl From<TrackingState> for FrameStatus {
    fn from(state: TrackingState) -> Self {
        match state {
            TrackingState::Localizing => FrameStatus::Localizing,
            TrackingState::Tracking => FrameStatus::Tracking,
        }
    }
}

impl std::fmt::Display for TrackingState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Localizing => write!(f, "LOCALIZING"),
            Self::Tracking => write!(f, "TRACKING"),
        }
    }
}
