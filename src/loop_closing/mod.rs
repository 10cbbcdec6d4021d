//! Loop closing between local maps.
//!
//! # Pipeline
//!
//! 1. **Matching** (`matcher.rs`): pair landmark items of a query local map
//!    with items of older local maps by descriptor distance
//! 2. **Voting** (`voting.rs`): aggregate the pairs into per-candidate counts
//!    and ratios
//! 3. **Verification** (`alignment.rs`): rigid RANSAC alignment of the
//!    matched item coordinates
//! 4. **Detection** (`detector.rs`): rank candidates by votes and return the
//!    first verified one
//!
//! The merge itself is recorded by [`crate::map::WorldMap::close_local_maps`].

pub mod alignment;
pub mod detector;
pub mod matcher;
pub mod voting;

pub use alignment::{align_matches, align_points, Alignment, AlignmentConfig};
pub use detector::{LoopCandidate, LoopClosureConfig, LoopDetector};
pub use matcher::match_local_maps;
pub use voting::{aggregate_votes, total_matches, Correspondence, Match, MatchMap};
