//! Brute-force appearance matching between local maps.

use std::collections::BTreeMap;

use tracing::debug;

use crate::map::{LocalMap, LocalMapId};

use super::voting::{Match, MatchMap};

/// Match every item of `query` against each candidate local map.
///
/// For each query item and candidate, the reference item with the lowest
/// Hamming distance below `maximum_distance` is recorded under the
/// candidate's id. The query map itself is never a candidate.
pub fn match_local_maps<'a>(
    query: &'a LocalMap,
    candidates: &[&'a LocalMap],
    maximum_distance: u32,
) -> MatchMap<'a, LocalMapId> {
    let mut matches: MatchMap<'a, LocalMapId> = BTreeMap::new();

    for &candidate in candidates.iter().filter(|c| c.id != query.id) {
        for query_item in &query.items {
            let best = candidate
                .items
                .iter()
                .map(|reference| (reference, query_item.descriptor.distance(&reference.descriptor)))
                .filter(|(_, distance)| *distance < maximum_distance)
                .min_by_key(|(_, distance)| *distance);

            if let Some((reference, distance)) = best {
                matches.entry(candidate.id).or_default().push(Match {
                    query: query_item,
                    reference,
                    distance,
                });
            }
        }
    }

    debug!(
        "Local map {}: matches against {} candidates: {:?}",
        query.id,
        candidates.len(),
        matches.iter().map(|(id, m)| (id.0, m.len())).collect::<Vec<_>>()
    );

    matches
}
