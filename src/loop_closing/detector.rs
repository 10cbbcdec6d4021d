//! Loop detection between local maps.
//!
//! A freshly created local map is matched against older local maps, the
//! matches are aggregated into votes, and candidates are verified in order
//! of decreasing vote count by rigid alignment of their matched items.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Deserialize;
use tracing::{debug, info};

use crate::error::{Result, SlamError};
use crate::geometry::SE3;
use crate::map::{LocalMap, LocalMapId, WorldMap};

use super::alignment::{align_matches, AlignmentConfig};
use super::matcher::match_local_maps;
use super::voting::aggregate_votes;

/// Configuration for loop detection.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoopClosureConfig {
    /// Hamming distance below which two items match.
    pub maximum_descriptor_distance: u32,

    /// Local maps closer than this (in creation order) to the query are not
    /// considered, since they share most of their landmarks.
    pub minimum_local_map_gap: usize,

    /// Matches a candidate needs before it is verified.
    pub minimum_matches: usize,

    pub alignment: AlignmentConfig,

    /// Seed for the RANSAC sampler.
    pub seed: u64,
}

impl Default for LoopClosureConfig {
    fn default() -> Self {
        Self {
            maximum_descriptor_distance: 25,
            minimum_local_map_gap: 5,
            minimum_matches: 15,
            alignment: AlignmentConfig::default(),
            seed: 0,
        }
    }
}

/// A verified loop between two local maps.
#[derive(Debug, Clone)]
pub struct LoopCandidate {
    pub query: LocalMapId,
    pub reference: LocalMapId,
    pub query_to_reference: SE3,
    pub matching_count: usize,
    pub matching_ratio: f64,
    pub inliers: usize,
}

pub struct LoopDetector {
    config: LoopClosureConfig,
    rng: StdRng,
}

impl LoopDetector {
    pub fn new(config: LoopClosureConfig) -> Self {
        let rng = StdRng::seed_from_u64(config.seed);
        Self { config, rng }
    }

    pub fn config(&self) -> &LoopClosureConfig {
        &self.config
    }

    /// Look for a verified loop closing `query` against an older local map.
    pub fn detect(&mut self, map: &WorldMap, query: LocalMapId) -> Result<Option<LoopCandidate>> {
        let query_map = map.local_map(query).ok_or(SlamError::UnknownLocalMap(query))?;
        let gap = self.config.minimum_local_map_gap as u64;
        let candidates: Vec<&LocalMap> = map
            .local_maps()
            .iter()
            .filter(|candidate| candidate.id.0 + gap <= query.0)
            .collect();
        if candidates.is_empty() {
            return Ok(None);
        }

        let matches = match_local_maps(query_map, &candidates, self.config.maximum_descriptor_distance);
        let votes = aggregate_votes(&matches);

        let mut ranked: Vec<_> = votes
            .iter()
            .filter(|(_, vote)| vote.matching_count >= self.config.minimum_matches)
            .collect();
        ranked.sort_by(|a, b| b.1.matching_count.cmp(&a.1.matching_count));

        for (&reference, vote) in ranked {
            let Some(group) = matches.get(&reference) else {
                continue;
            };
            let Some(alignment) = align_matches(group, &self.config.alignment, &mut self.rng) else {
                debug!(
                    "{} -> {}: {} matches failed verification",
                    query, reference, vote.matching_count
                );
                continue;
            };

            info!(
                "Loop {} -> {}: {} matches (ratio {:.2}), {} inliers",
                query,
                reference,
                vote.matching_count,
                vote.matching_ratio,
                alignment.inliers.len()
            );
            return Ok(Some(LoopCandidate {
                query,
                reference,
                query_to_reference: alignment.query_to_reference,
                matching_count: vote.matching_count,
                matching_ratio: vote.matching_ratio,
                inliers: alignment.inliers.len(),
            }));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Descriptor, LandmarkId, LandmarkItem, WorldMapConfig, DESCRIPTOR_BYTES};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use rand::Rng;

    /// World map with `count` single-frame local maps. Local map 0 holds 30
    /// random items; each map in `revisit` sees the same items through its
    /// query-to-reference transform.
    fn map_with_local_maps(count: usize, revisit: &[(usize, SE3)]) -> WorldMap {
        let config = WorldMapConfig {
            minimum_distance_traveled_for_local_map: 0.0,
            minimum_degrees_rotated_for_local_map: 0.0,
            minimum_number_of_frames_for_local_map: 1,
        };
        let mut map = WorldMap::new(config);
        for i in 0..count {
            map.create_frame(i as f64, SE3::identity());
            map.create_local_map();
        }
        assert_eq!(map.num_local_maps(), count);

        let mut rng = StdRng::seed_from_u64(3);
        let items: Vec<LandmarkItem> = (0..30)
            .map(|i| {
                let mut bytes = [0u8; DESCRIPTOR_BYTES];
                rng.fill(&mut bytes[..]);
                LandmarkItem {
                    landmark: LandmarkId::new(i),
                    descriptor: Descriptor(bytes),
                    coordinates: Vector3::new(
                        rng.gen_range(-3.0..3.0),
                        rng.gen_range(-1.0..1.0),
                        rng.gen_range(2.0..6.0),
                    ),
                }
            })
            .collect();

        for &(index, ref query_to_reference) in revisit {
            let reference_to_query = query_to_reference.inverse();
            let copied = items
                .iter()
                .map(|item| LandmarkItem {
                    coordinates: reference_to_query.transform_point(&item.coordinates),
                    ..item.clone()
                })
                .collect();
            map.local_map_mut(LocalMapId::new(index as u64)).unwrap().items = copied;
        }
        map.local_map_mut(LocalMapId::new(0)).unwrap().items = items;
        map
    }

    #[test]
    fn test_detects_revisit() {
        let truth = SE3::from_scaled_axis(Vector3::new(0.0, 0.2, 0.0), Vector3::new(0.3, 0.0, -0.1));
        let map = map_with_local_maps(8, &[(7, truth)]);

        let mut detector = LoopDetector::new(LoopClosureConfig::default());
        let candidate = detector.detect(&map, LocalMapId::new(7)).unwrap().unwrap();
        assert_eq!(candidate.reference, LocalMapId::new(0));
        assert_eq!(candidate.matching_count, 30);
        assert_relative_eq!(candidate.matching_ratio, 1.0);
        assert_relative_eq!(candidate.query_to_reference.translation, truth.translation, epsilon = 1e-9);
    }

    #[test]
    fn test_ignores_recent_local_maps() {
        let map = map_with_local_maps(4, &[(3, SE3::identity())]);
        let mut detector = LoopDetector::new(LoopClosureConfig::default());
        assert!(detector.detect(&map, LocalMapId::new(3)).unwrap().is_none());
    }

    #[test]
    fn test_unknown_query() {
        let map = map_with_local_maps(1, &[]);
        let mut detector = LoopDetector::new(LoopClosureConfig::default());
        assert!(matches!(
            detector.detect(&map, LocalMapId::new(9)),
            Err(SlamError::UnknownLocalMap(_))
        ));
    }
}
