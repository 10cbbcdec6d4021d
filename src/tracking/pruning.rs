//! Post-refinement point pruning and new point admission.

use crate::geometry::SE3;
use crate::map::FramePoint;

use super::candidate_grid::CandidateGrid;
use super::pose_solver::Residual;

/// Drop landmark points the pose solver classified as outliers.
///
/// Points without a landmark, points the solver skipped and inliers are kept.
/// `points` and `residuals` are compacted in lockstep, so calling this again
/// with the same vectors removes nothing. Returns the number of dropped points.
pub fn prune_points(points: &mut Vec<FramePoint>, residuals: &mut Vec<Residual>) -> usize {
    assert_eq!(
        points.len(),
        residuals.len(),
        "one residual per point expected"
    );

    let before = points.len();
    let keep: Vec<bool> = points
        .iter()
        .zip(residuals.iter())
        .map(|(point, residual)| {
            point.landmark.is_none() || !residual.is_evaluated() || residual.is_inlier()
        })
        .collect();

    let mut flags = keep.iter().copied();
    points.retain(|_| flags.next().unwrap_or(true));
    let mut flags = keep.iter().copied();
    residuals.retain(|_| flags.next().unwrap_or(true));

    before - points.len()
}

/// Append every remaining candidate to `points` with world coordinates from
/// `robot_to_world`, emptying the grid. Returns the number of admitted points.
pub fn admit_new_points(points: &mut Vec<FramePoint>, grid: &mut CandidateGrid, robot_to_world: &SE3) -> usize {
    let before = points.len();
    points.extend(grid.drain().map(|mut point| {
        point.world_coordinates = robot_to_world.transform_point(&point.robot_coordinates);
        point
    }));
    points.len() - before
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{Descriptor, FrameId, GridCell, LandmarkId};
    use approx::assert_relative_eq;
    use nalgebra::{Vector2, Vector3};

    fn point(col: usize, landmark: Option<u64>) -> FramePoint {
        let mut p = FramePoint::new(
            FrameId::new(1),
            GridCell::new(0, col),
            Vector2::new(col as f64, 0.0),
            Descriptor::zeros(),
            Vector3::new(col as f64, 0.0, 2.0),
            2.0,
            true,
        );
        p.landmark = landmark.map(LandmarkId::new);
        p
    }

    fn outlier() -> Residual {
        Residual::Evaluated { error: 5.0, inlier: false }
    }

    fn inlier() -> Residual {
        Residual::Evaluated { error: 0.01, inlier: true }
    }

    #[test]
    fn test_prune_keeps_points_without_landmark_or_residual() {
        let mut points = vec![
            point(0, None),
            point(1, Some(1)),
            point(2, Some(2)),
            point(3, Some(3)),
            point(4, None),
        ];
        let mut residuals = vec![outlier(), outlier(), Residual::Skipped, inlier(), inlier()];

        let removed = prune_points(&mut points, &mut residuals);
        assert_eq!(removed, 1);

        let cols: Vec<usize> = points.iter().map(|p| p.cell.col).collect();
        assert_eq!(cols, vec![0, 2, 3, 4]);
        assert_eq!(residuals.len(), 4);
    }

    #[test]
    fn test_prune_is_idempotent() {
        let mut points = vec![point(0, Some(1)), point(1, Some(2)), point(2, None)];
        let mut residuals = vec![outlier(), inlier(), outlier()];

        prune_points(&mut points, &mut residuals);
        let first: Vec<GridCell> = points.iter().map(|p| p.cell).collect();

        assert_eq!(prune_points(&mut points, &mut residuals), 0);
        let second: Vec<GridCell> = points.iter().map(|p| p.cell).collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_admit_new_points_drains_grid() {
        let mut grid = CandidateGrid::new(10, 10);
        grid.insert(point(3, None));
        grid.insert(point(5, None));
        let mut points = vec![point(1, Some(0))];

        let pose = SE3::from_translation(Vector3::new(0.0, 1.0, 0.0));
        let admitted = admit_new_points(&mut points, &mut grid, &pose);

        assert_eq!(admitted, 2);
        assert!(grid.is_empty());
        assert_eq!(points.len(), 3);
        assert_relative_eq!(points[2].world_coordinates, Vector3::new(5.0, 1.0, 2.0), epsilon = 1e-12);
    }
}
