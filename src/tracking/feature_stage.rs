//! Feature stage interface: produces the candidate grid of a frame.

use crate::error::Result;
use crate::map::Frame;

use super::candidate_grid::CandidateGrid;

/// Descriptor distance gates for the two correspondence stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatchingThresholds {
    pub point: u32,
    pub region: u32,
}

/// Detection, description and triangulation of candidate points.
pub trait FeatureStage {
    /// Compute the candidate grid for `frame`.
    ///
    /// Candidates carry robot coordinates; world coordinates are assigned by
    /// the tracker once the frame pose is known.
    fn compute(&mut self, frame: &Frame) -> Result<CandidateGrid>;

    fn image_rows(&self) -> usize;

    fn image_cols(&self) -> usize;

    /// Descriptor thresholds tuned for this stage's descriptors.
    ///
    /// `None` leaves the tracker configuration in charge.
    fn matching_thresholds(&self) -> Option<MatchingThresholds> {
        None
    }
}
