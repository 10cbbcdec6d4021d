//! Vote aggregation for loop-closure candidates.
//!
//! Appearance matches between landmark items are grouped by candidate key.
//! Aggregation counts the matches of each candidate and relates them to the
//! total number of matches. Ranking and thresholding happen downstream.

use std::collections::BTreeMap;

use crate::map::LandmarkItem;

/// Appearance pairing between a query item and a reference item.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub query: &'a LandmarkItem,
    pub reference: &'a LandmarkItem,
    /// Hamming distance between the two descriptors.
    pub distance: u32,
}

/// Matches grouped by candidate key.
pub type MatchMap<'a, K> = BTreeMap<K, Vec<Match<'a>>>;

/// Aggregated vote of one candidate.
#[derive(Debug, Clone, Copy)]
pub struct Correspondence<'a> {
    /// Query item of the candidate's closest match.
    pub query: &'a LandmarkItem,
    /// Reference item of the candidate's closest match.
    pub reference: &'a LandmarkItem,
    pub matching_count: usize,
    /// `matching_count` over the total number of matches of all candidates.
    pub matching_ratio: f64,
}

/// Total number of matches across all candidates.
pub fn total_matches<K>(matches: &MatchMap<'_, K>) -> usize {
    matches.values().map(Vec::len).sum()
}

/// Count and ratio per candidate.
///
/// Candidates without matches get no entry. The representative item pair is
/// the match with the lowest descriptor distance (first one on ties).
pub fn aggregate_votes<'a, K: Ord + Clone>(matches: &MatchMap<'a, K>) -> BTreeMap<K, Correspondence<'a>> {
    let total = total_matches(matches);
    matches
        .iter()
        .filter_map(|(key, group)| {
            let best = group.iter().min_by_key(|m| m.distance)?;
            Some((
                key.clone(),
                Correspondence {
                    query: best.query,
                    reference: best.reference,
                    matching_count: group.len(),
                    matching_ratio: group.len() as f64 / total as f64,
                },
            ))
        })
        .collect()
}
