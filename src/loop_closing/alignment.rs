//! Rigid alignment of matched landmark items with RANSAC.
//!
//! Finds `query_to_reference` such that reference item coordinates are
//! approximately `query_to_reference * query item coordinates`. Scale is
//! fixed since landmark coordinates are metric.

use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};
use rand::rngs::StdRng;
use rand::Rng;
use serde::Deserialize;

use crate::geometry::SE3;

use super::voting::Match;

/// Configuration for [`align_matches`].
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlignmentConfig {
    pub maximum_iterations: usize,

    /// Inlier threshold in meters (point-to-point error).
    pub inlier_distance: f64,

    pub minimum_inliers: usize,

    /// Probability of drawing at least one all-inlier sample.
    pub probability: f64,
}

impl Default for AlignmentConfig {
    fn default() -> Self {
        Self {
            maximum_iterations: 200,
            inlier_distance: 0.1,
            minimum_inliers: 10,
            probability: 0.99,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Alignment {
    pub query_to_reference: SE3,
    /// Indices into the aligned match slice.
    pub inliers: Vec<usize>,
    /// Mean squared error of the inliers.
    pub mse: f64,
}

/// Estimate the rigid transform between the query and reference items of
/// `matches`. Returns `None` below `minimum_inliers`.
pub fn align_matches(matches: &[Match<'_>], config: &AlignmentConfig, rng: &mut StdRng) -> Option<Alignment> {
    let query: Vec<Vector3<f64>> = matches.iter().map(|m| m.query.coordinates).collect();
    let reference: Vec<Vector3<f64>> = matches.iter().map(|m| m.reference.coordinates).collect();
    align_points(&query, &reference, config, rng)
}

pub fn align_points(
    query: &[Vector3<f64>],
    reference: &[Vector3<f64>],
    config: &AlignmentConfig,
    rng: &mut StdRng,
) -> Option<Alignment> {
    let n = query.len();
    if n < 3 || n != reference.len() || n < config.minimum_inliers {
        return None;
    }

    let mut best: Option<Alignment> = None;
    let mut max_iterations = config.maximum_iterations;
    let mut iteration = 0;

    while iteration < max_iterations {
        let sample = sample_three_indices(rng, n);
        iteration += 1;

        let sample_query = sample.map(|i| query[i]);
        let sample_reference = sample.map(|i| reference[i]);
        let Some(transform) = horn(&sample_query, &sample_reference) else {
            continue;
        };

        let (inliers, mse) = find_inliers(query, reference, &transform, config.inlier_distance);
        if best.as_ref().map_or(true, |b| inliers.len() > b.inliers.len()) {
            if inliers.len() >= config.minimum_inliers {
                let ratio = inliers.len() as f64 / n as f64;
                max_iterations = iteration_limit(max_iterations, iteration, ratio, config.probability);
            }
            best = Some(Alignment {
                query_to_reference: transform,
                inliers,
                mse,
            });
        }
    }

    let mut best = best.filter(|b| b.inliers.len() >= config.minimum_inliers)?;

    // refit on all inliers
    let inlier_query: Vec<_> = best.inliers.iter().map(|&i| query[i]).collect();
    let inlier_reference: Vec<_> = best.inliers.iter().map(|&i| reference[i]).collect();
    if let Some(refined) = horn(&inlier_query, &inlier_reference) {
        let (inliers, mse) = find_inliers(query, reference, &refined, config.inlier_distance);
        if inliers.len() >= best.inliers.len() {
            best = Alignment {
                query_to_reference: refined,
                inliers,
                mse,
            };
        }
    }
    Some(best)
}

/// Closed-form rigid alignment (Horn / Kabsch) with reflection handling.
fn horn(query: &[Vector3<f64>], reference: &[Vector3<f64>]) -> Option<SE3> {
    if query.len() < 3 {
        return None;
    }
    let centroid_query = centroid(query);
    let centroid_reference = centroid(reference);

    let mut h = Matrix3::zeros();
    for (q, r) in query.iter().zip(reference) {
        h += (q - centroid_query) * (r - centroid_reference).transpose();
    }
    if h.norm() < 1e-12 {
        return None;
    }

    let svd = h.svd(true, true);
    let u = svd.u?;
    let v = svd.v_t?.transpose();

    let mut rotation = v * u.transpose();
    if rotation.determinant() < 0.0 {
        let mut flipped = v;
        for i in 0..3 {
            flipped[(i, 2)] = -flipped[(i, 2)];
        }
        rotation = flipped * u.transpose();
    }

    let rotation = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(rotation));
    let translation = centroid_reference - rotation * centroid_query;
    Some(SE3::new(rotation, translation))
}

fn centroid(points: &[Vector3<f64>]) -> Vector3<f64> {
    points.iter().sum::<Vector3<f64>>() / points.len() as f64
}

fn find_inliers(
    query: &[Vector3<f64>],
    reference: &[Vector3<f64>],
    transform: &SE3,
    threshold: f64,
) -> (Vec<usize>, f64) {
    let threshold_sq = threshold * threshold;
    let mut inliers = Vec::new();
    let mut sum_sq_error = 0.0;

    for (i, (q, r)) in query.iter().zip(reference).enumerate() {
        let error_sq = (transform.transform_point(q) - r).norm_squared();
        if error_sq < threshold_sq {
            inliers.push(i);
            sum_sq_error += error_sq;
        }
    }

    let mse = if inliers.is_empty() {
        f64::INFINITY
    } else {
        sum_sq_error / inliers.len() as f64
    };
    (inliers, mse)
}

fn sample_three_indices(rng: &mut StdRng, n: usize) -> [usize; 3] {
    let first = rng.gen_range(0..n);
    let mut second = rng.gen_range(0..n);
    while second == first {
        second = rng.gen_range(0..n);
    }
    let mut third = rng.gen_range(0..n);
    while third == first || third == second {
        third = rng.gen_range(0..n);
    }
    [first, second, third]
}

/// Tighten `max_iterations` once `iteration` found an inlier ratio of `ratio`.
fn iteration_limit(max_iterations: usize, iteration: usize, ratio: f64, probability: f64) -> usize {
    max_iterations.min(iteration.saturating_add(adaptive_iterations(ratio, probability, 3)))
}

/// k = log(1 - p) / log(1 - w^n)
fn adaptive_iterations(inlier_ratio: f64, probability: f64, sample_size: i32) -> usize {
    if inlier_ratio >= 1.0 {
        return 1;
    }
    let log_denominator = (1.0 - inlier_ratio.powi(sample_size)).ln();
    if log_denominator.abs() < 1e-10 {
        return usize::MAX;
    }
    let k = (1.0 - probability).ln() / log_denominator;
    (k.ceil() as usize).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;

    fn scatter(n: usize) -> Vec<Vector3<f64>> {
        (0..n)
            .map(|i| {
                let i = i as f64;
                Vector3::new((i * 0.7).sin() * 3.0, (i * 1.3).cos(), 2.0 + (i * 0.4).sin() * 2.0)
            })
            .collect()
    }

    #[test]
    fn test_horn_recovers_transform() {
        let truth = SE3::from_scaled_axis(Vector3::new(0.1, 0.4, -0.2), Vector3::new(1.0, -2.0, 0.5));
        let query = scatter(12);
        let reference: Vec<_> = query.iter().map(|p| truth.transform_point(p)).collect();

        let estimate = horn(&query, &reference).unwrap();
        for (q, r) in query.iter().zip(&reference) {
            assert_relative_eq!(estimate.transform_point(q), *r, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_ransac_rejects_outliers() {
        let truth = SE3::from_scaled_axis(Vector3::new(0.0, 0.3, 0.0), Vector3::new(0.2, 0.0, -0.4));
        let query = scatter(40);
        let mut reference: Vec<_> = query.iter().map(|p| truth.transform_point(p)).collect();
        for r in reference.iter_mut().step_by(5) {
            *r += Vector3::new(1.5, -1.0, 2.0);
        }

        let mut rng = StdRng::seed_from_u64(7);
        let alignment = align_points(&query, &reference, &AlignmentConfig::default(), &mut rng).unwrap();
        assert_eq!(alignment.inliers.len(), 32);
        assert!(alignment.inliers.iter().all(|i| i % 5 != 0));
        assert_relative_eq!(
            alignment.query_to_reference.translation,
            truth.translation,
            epsilon = 1e-9
        );
    }

    #[test]
    fn test_iteration_limit_with_tiny_inlier_ratio() {
        assert_eq!(adaptive_iterations(1e-4, 0.99, 3), usize::MAX);
        assert_eq!(iteration_limit(200, 17, 1e-4, 0.99), 200);
        assert_eq!(iteration_limit(200, 17, 1.0, 0.99), 18);
        assert!(iteration_limit(200, 17, 0.8, 0.99) < 200);
    }

    #[test]
    fn test_too_few_points() {
        let query = scatter(5);
        let mut rng = StdRng::seed_from_u64(1);
        assert!(align_points(&query, &query, &AlignmentConfig::default(), &mut rng).is_none());
    }
}
