//! Frame-to-frame correspondence search.
//!
//! Every previous-frame point is projected into the current image under the
//! predicted pose and matched against the candidate grid in two stages:
//!
//! 1. Vicinity: a small fixed-radius window around the projection, gated by
//!    the point descriptor threshold.
//! 2. Region: a window as wide as the active pixel threshold, skipping the
//!    cells already scanned in stage 1, gated by the region threshold.
//!
//! Within a stage the candidate closest to the projection (Manhattan pixel
//! distance) wins; the descriptor distance only gates. A selected candidate
//! must also stay within the squared pixel flow bound of the previous point's
//! own image location. Matching is greedy: the first previous point to claim
//! a candidate takes it out of the grid.

use nalgebra::Vector3;

use crate::geometry::{Camera, SE3};
use crate::map::{Descriptor, Frame, FramePair, FramePoint, FramePointRef, GridCell};

use super::candidate_grid::CandidateGrid;
use super::feature_stage::MatchingThresholds;

/// Parameters of one correspondence search.
#[derive(Debug, Clone, Copy)]
pub struct SearchParameters {
    /// Half width of the stage 1 window (px).
    pub vicinity_range: usize,
    /// Active pixel distance threshold; also the stage 2 half width.
    pub pixel_distance_threshold: usize,
    pub matching_thresholds: MatchingThresholds,
    pub maximum_flow_pixels_squared: i64,
}

/// Outcome of matching the previous frame against the candidate grid.
#[derive(Debug, Default, Clone)]
pub struct CorrespondenceResult {
    pub tracked_points: usize,
    pub tracked_landmarks_close: usize,
    pub tracked_landmarks_far: usize,
    pub vicinity_matches: usize,
    pub regional_matches: usize,
    /// Previous points whose projection fell outside the image.
    pub out_of_view: usize,
    /// Unmatched previous points that own a landmark.
    pub lost_points: Vec<FramePointRef>,
}

impl CorrespondenceResult {
    pub fn tracked_landmarks(&self) -> usize {
        self.tracked_landmarks_close + self.tracked_landmarks_far
    }
}

/// Inclusive pixel window clamped to the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    row_start: usize,
    row_end: usize,
    col_start: usize,
    col_end: usize,
}

impl Window {
    fn around(row: i64, col: i64, radius: usize, rows: usize, cols: usize) -> Option<Self> {
        if rows == 0 || cols == 0 {
            return None;
        }
        let radius = radius as i64;
        let row_start = (row - radius).max(0);
        let row_end = (row + radius).min(rows as i64 - 1);
        let col_start = (col - radius).max(0);
        let col_end = (col + radius).min(cols as i64 - 1);
        if row_start > row_end || col_start > col_end {
            return None;
        }
        Some(Self {
            row_start: row_start as usize,
            row_end: row_end as usize,
            col_start: col_start as usize,
            col_end: col_end as usize,
        })
    }

    fn contains(&self, cell: &GridCell) -> bool {
        (self.row_start..=self.row_end).contains(&cell.row)
            && (self.col_start..=self.col_end).contains(&cell.col)
    }
}

/// Two-stage bounded spatial search between consecutive frames.
pub struct CorrespondenceSearch<'a> {
    camera: &'a Camera,
    parameters: SearchParameters,
}

impl<'a> CorrespondenceSearch<'a> {
    pub fn new(camera: &'a Camera, parameters: SearchParameters) -> Self {
        Self { camera, parameters }
    }

    pub fn parameters(&self) -> &SearchParameters {
        &self.parameters
    }

    /// Link the previous frame's points to candidates of the current frame.
    ///
    /// Matched candidates are moved from the grid into `pair.current`.
    pub fn track(&self, pair: FramePair<'_>, grid: &mut CandidateGrid) -> CorrespondenceResult {
        let FramePair {
            previous,
            current,
            landmarks,
        } = pair;
        debug_assert!(current.points.is_empty(), "current frame already holds points");

        let world_to_camera = self.camera.world_to_camera(&current.robot_to_world);
        let thresholds = self.parameters.matching_thresholds;
        let mut result = CorrespondenceResult::default();

        for (index, previous_point) in previous.points.iter().enumerate() {
            let previous_ref = FramePointRef::new(previous.id, index);
            let target = match previous_point.landmark.and_then(|id| landmarks.get(&id)) {
                Some(landmark) => landmark.prediction_target(&previous_point.world_coordinates),
                None => previous_point.world_coordinates,
            };

            let Some((row, col)) = self.project(&world_to_camera, &target) else {
                result.out_of_view += 1;
                continue;
            };

            // Stage 1: point vicinity
            let vicinity = Window::around(
                row,
                col,
                self.parameters.vicinity_range,
                grid.rows(),
                grid.cols(),
            );
            if let Some(window) = &vicinity {
                let best = self.best_candidate(
                    grid,
                    window,
                    None,
                    (row, col),
                    &previous_point.descriptor,
                    thresholds.point,
                );
                if let Some(cell) = best.filter(|cell| self.flow_ok(cell, previous_point)) {
                    self.accept(grid, current, cell, previous_point, previous_ref, &mut result);
                    result.vicinity_matches += 1;
                    continue;
                }
            }

            // Stage 2: region around the projection
            let region = Window::around(
                row,
                col,
                self.parameters.pixel_distance_threshold,
                grid.rows(),
                grid.cols(),
            );
            if let Some(window) = &region {
                let best = self.best_candidate(
                    grid,
                    window,
                    vicinity.as_ref(),
                    (row, col),
                    &previous_point.descriptor,
                    thresholds.region,
                );
                if let Some(cell) = best.filter(|cell| self.flow_ok(cell, previous_point)) {
                    self.accept(grid, current, cell, previous_point, previous_ref, &mut result);
                    result.regional_matches += 1;
                    continue;
                }
            }

            if previous_point.landmark.is_some() {
                result.lost_points.push(previous_ref);
            }
        }

        tracing::debug!(
            "Tracked {}/{} points ({} close, {} far landmarks), lost {}, out of view {}",
            result.tracked_points,
            previous.points.len(),
            result.tracked_landmarks_close,
            result.tracked_landmarks_far,
            result.lost_points.len(),
            result.out_of_view
        );
        result
    }

    /// Search lost landmark points again under the refined pose.
    ///
    /// Uses the regional window and region threshold; the flow bound is not
    /// applied. Recovered points are appended to `pair.current` linked to
    /// their lost predecessor. Returns the number of recovered points.
    pub fn recover(&self, lost_points: &[FramePointRef], pair: FramePair<'_>, grid: &mut CandidateGrid) -> usize {
        let FramePair {
            previous,
            current,
            landmarks,
        } = pair;
        let world_to_camera = self.camera.world_to_camera(&current.robot_to_world);
        let threshold = self.parameters.matching_thresholds.region;
        let mut scratch = CorrespondenceResult::default();

        for lost in lost_points {
            debug_assert_eq!(lost.frame, previous.id);
            let Some(previous_point) = previous.points.get(lost.index) else {
                continue;
            };
            let target = match previous_point.landmark.and_then(|id| landmarks.get(&id)) {
                Some(landmark) => landmark.prediction_target(&previous_point.world_coordinates),
                None => previous_point.world_coordinates,
            };
            let Some((row, col)) = self.project(&world_to_camera, &target) else {
                continue;
            };
            let Some(window) = Window::around(
                row,
                col,
                self.parameters.pixel_distance_threshold,
                grid.rows(),
                grid.cols(),
            ) else {
                continue;
            };
            let best = self.best_candidate(
                grid,
                &window,
                None,
                (row, col),
                &previous_point.descriptor,
                threshold,
            );
            if let Some(cell) = best {
                self.accept(grid, current, cell, previous_point, *lost, &mut scratch);
            }
        }

        if scratch.tracked_points > 0 {
            tracing::debug!(
                "Recovered {}/{} lost points",
                scratch.tracked_points,
                lost_points.len()
            );
        }
        scratch.tracked_points
    }

    fn project(&self, world_to_camera: &SE3, point_in_world: &Vector3<f64>) -> Option<(i64, i64)> {
        self.camera
            .project_world(world_to_camera, point_in_world)
            .map(|pixel| (pixel.y.round() as i64, pixel.x.round() as i64))
    }

    /// Closest candidate to the projection whose descriptor passes `threshold`.
    fn best_candidate(
        &self,
        grid: &CandidateGrid,
        window: &Window,
        exclude: Option<&Window>,
        (row, col): (i64, i64),
        descriptor: &Descriptor,
        threshold: u32,
    ) -> Option<GridCell> {
        let mut pixel_distance_best = self.parameters.pixel_distance_threshold as i64;
        let mut best = None;

        for (cell, candidate) in grid.window(
            window.row_start..=window.row_end,
            window.col_start..=window.col_end,
        ) {
            if exclude.is_some_and(|excluded| excluded.contains(cell)) {
                continue;
            }
            let pixel_distance = (row - cell.row as i64).abs() + (col - cell.col as i64).abs();
            if pixel_distance < pixel_distance_best && descriptor.distance(&candidate.descriptor) < threshold {
                pixel_distance_best = pixel_distance;
                best = Some(*cell);
            }
        }
        best
    }

    fn flow_ok(&self, cell: &GridCell, previous_point: &FramePoint) -> bool {
        let row_delta = cell.row as i64 - previous_point.image_row();
        let col_delta = cell.col as i64 - previous_point.image_col();
        row_delta * row_delta + col_delta * col_delta < self.parameters.maximum_flow_pixels_squared
    }

    fn accept(
        &self,
        grid: &mut CandidateGrid,
        current: &mut Frame,
        cell: GridCell,
        previous_point: &FramePoint,
        previous_ref: FramePointRef,
        result: &mut CorrespondenceResult,
    ) {
        let Some(mut point) = grid.take(cell.row, cell.col) else {
            return;
        };
        point.link_to(previous_point, previous_ref);
        if point.landmark.is_some() {
            if point.is_near {
                result.tracked_landmarks_close += 1;
            } else {
                result.tracked_landmarks_far += 1;
            }
        }
        current.points.push(point);
        result.tracked_points += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::{FrameId, LandmarkId, WorldMap, DESCRIPTOR_BYTES};
    use nalgebra::Vector2;

    const ROWS: usize = 200;
    const COLS: usize = 200;

    fn camera() -> Camera {
        Camera::from_intrinsics(ROWS, COLS, 100.0, 100.0, 100.0, 100.0)
    }

    fn parameters() -> SearchParameters {
        SearchParameters {
            vicinity_range: 2,
            pixel_distance_threshold: 16,
            matching_thresholds: MatchingThresholds { point: 40, region: 40 },
            maximum_flow_pixels_squared: 25,
        }
    }

    /// Descriptor with the first `bits` bits set.
    fn descriptor(bits: usize) -> Descriptor {
        let mut bytes = [0u8; DESCRIPTOR_BYTES];
        for bit in 0..bits {
            bytes[bit / 8] |= 1 << (bit % 8);
        }
        Descriptor(bytes)
    }

    /// Point at pixel (row, col) seen at depth 2 by a robot at the origin.
    fn point_at(frame: FrameId, row: usize, col: usize, bits: usize) -> FramePoint {
        let depth = 2.0;
        let robot = Vector3::new(
            (col as f64 - 100.0) / 100.0 * depth,
            (row as f64 - 100.0) / 100.0 * depth,
            depth,
        );
        let mut p = FramePoint::new(
            frame,
            GridCell::new(row, col),
            Vector2::new(col as f64, row as f64),
            descriptor(bits),
            robot,
            depth,
            true,
        );
        p.world_coordinates = robot;
        p
    }

    /// Map with two frames at the origin; the previous frame holds `points`.
    fn setup(points: Vec<FramePoint>) -> (WorldMap, FrameId, FrameId) {
        let mut map = WorldMap::default();
        let previous = map.create_frame(0.0, SE3::identity());
        map.frame_mut(previous).unwrap().points = points;
        let current = map.create_frame(0.1, SE3::identity());
        (map, previous, current)
    }

    #[test]
    fn test_six_of_ten_tracked_rest_lost() {
        let previous_id = FrameId::new(0);
        let current_id = FrameId::new(1);
        let mut previous_points = Vec::new();
        let mut grid = CandidateGrid::new(ROWS, COLS);

        let mut n = 0;
        for row in [40, 120] {
            for col in [20, 60, 100, 140, 180] {
                let mut p = point_at(previous_id, row, col, 0);
                p.landmark = Some(LandmarkId::new(n));
                previous_points.push(p);

                // first six have a close, similar candidate; the rest only a
                // dissimilar one
                let bits = if n < 6 { 10 } else { 60 };
                grid.insert(point_at(current_id, row + 1, col + 1, bits));
                n += 1;
            }
        }

        let (mut map, previous, current) = setup(previous_points);
        let cam = camera();
        let search = CorrespondenceSearch::new(&cam, parameters());
        let result = search.track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);

        assert_eq!(result.tracked_points, 6);
        assert_eq!(result.vicinity_matches, 6);
        assert_eq!(result.lost_points.len(), 4);
        assert_eq!(result.tracked_landmarks_close, 6);
        assert_eq!(grid.len(), 4);

        let frame = map.frame(current).unwrap();
        assert_eq!(frame.points.len(), 6);
        assert!(frame.points.iter().all(|p| p.track_length == 1));
        assert_eq!(frame.points[0].previous, Some(FramePointRef::new(previous, 0)));
        assert_eq!(result.lost_points[0], FramePointRef::new(previous, 6));
    }

    #[test]
    fn test_unmatched_points_without_landmark_are_discarded() {
        let previous_id = FrameId::new(0);
        let (mut map, previous, current) = setup(vec![point_at(previous_id, 50, 50, 0)]);
        let mut grid = CandidateGrid::new(ROWS, COLS);

        let cam = camera();
        let result = CorrespondenceSearch::new(&cam, parameters())
            .track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);
        assert_eq!(result.tracked_points, 0);
        assert!(result.lost_points.is_empty());
    }

    #[test]
    fn test_stage_one_never_selects_outside_vicinity() {
        let previous_id = FrameId::new(0);
        let current_id = FrameId::new(1);
        let (mut map, previous, current) = setup(vec![point_at(previous_id, 50, 50, 0)]);

        // three rows away: outside the radius-2 vicinity
        let mut grid = CandidateGrid::new(ROWS, COLS);
        grid.insert(point_at(current_id, 53, 50, 0));

        let cam = camera();
        let result = CorrespondenceSearch::new(&cam, parameters())
            .track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);
        assert_eq!(result.vicinity_matches, 0);
        assert_eq!(result.regional_matches, 1);
        assert_eq!(map.frame(current).unwrap().points[0].cell, GridCell::new(53, 50));
    }

    #[test]
    fn test_stage_two_skips_vicinity_cells() {
        let previous_id = FrameId::new(0);
        let current_id = FrameId::new(1);
        let mut first = point_at(previous_id, 50, 50, 0);
        first.landmark = Some(LandmarkId::new(0));
        let (mut map, previous, current) = setup(vec![first]);

        // inside the vicinity, passes the region gate but not the point gate
        let mut grid = CandidateGrid::new(ROWS, COLS);
        grid.insert(point_at(current_id, 51, 50, 20));

        let mut params = parameters();
        params.matching_thresholds = MatchingThresholds { point: 10, region: 50 };
        let cam = camera();
        let result = CorrespondenceSearch::new(&cam, params)
            .track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);

        assert_eq!(result.tracked_points, 0);
        assert_eq!(result.lost_points.len(), 1);
        assert!(grid.contains(51, 50));
    }

    #[test]
    fn test_closest_candidate_wins_regardless_of_descriptor() {
        let previous_id = FrameId::new(0);
        let current_id = FrameId::new(1);
        let (mut map, previous, current) = setup(vec![point_at(previous_id, 50, 50, 0)]);

        let mut grid = CandidateGrid::new(ROWS, COLS);
        grid.insert(point_at(current_id, 50, 51, 30));
        grid.insert(point_at(current_id, 52, 50, 0));

        let cam = camera();
        CorrespondenceSearch::new(&cam, parameters())
            .track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);
        assert_eq!(map.frame(current).unwrap().points[0].cell, GridCell::new(50, 51));
    }

    #[test]
    fn test_flow_bound_rejects_match() {
        let previous_id = FrameId::new(0);
        let current_id = FrameId::new(1);
        let mut moved = point_at(previous_id, 50, 50, 0);
        // previous observation far from where it now projects
        moved.image_left = Vector2::new(80.0, 50.0);
        let (mut map, previous, current) = setup(vec![moved]);

        let mut grid = CandidateGrid::new(ROWS, COLS);
        grid.insert(point_at(current_id, 50, 51, 0));

        let cam = camera();
        let result = CorrespondenceSearch::new(&cam, parameters())
            .track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);
        assert_eq!(result.tracked_points, 0);
        assert_eq!(grid.len(), 1);
    }

    #[test]
    fn test_greedy_first_match_wins() {
        let previous_id = FrameId::new(0);
        let current_id = FrameId::new(1);
        let (mut map, previous, current) = setup(vec![
            point_at(previous_id, 50, 50, 0),
            point_at(previous_id, 50, 52, 0),
        ]);

        let mut grid = CandidateGrid::new(ROWS, COLS);
        grid.insert(point_at(current_id, 50, 51, 0));

        let cam = camera();
        let result = CorrespondenceSearch::new(&cam, parameters())
            .track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);
        assert_eq!(result.tracked_points, 1);
        let frame = map.frame(current).unwrap();
        assert_eq!(frame.points[0].previous, Some(FramePointRef::new(previous, 0)));
    }

    #[test]
    fn test_out_of_view_points_are_dropped() {
        let previous_id = FrameId::new(0);
        let mut behind = point_at(previous_id, 50, 50, 0);
        behind.world_coordinates = Vector3::new(0.0, 0.0, -2.0);
        behind.landmark = Some(LandmarkId::new(3));
        let (mut map, previous, current) = setup(vec![behind]);

        let mut grid = CandidateGrid::new(ROWS, COLS);
        let cam = camera();
        let result = CorrespondenceSearch::new(&cam, parameters())
            .track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);
        assert_eq!(result.out_of_view, 1);
        assert!(result.lost_points.is_empty());
    }

    #[test]
    fn test_recover_links_lost_point() {
        let previous_id = FrameId::new(0);
        let current_id = FrameId::new(1);
        let mut lost = point_at(previous_id, 50, 50, 0);
        lost.landmark = Some(LandmarkId::new(1));
        lost.track_length = 4;
        let (mut map, previous, current) = setup(vec![lost]);

        let mut grid = CandidateGrid::new(ROWS, COLS);
        let cam = camera();
        let search = CorrespondenceSearch::new(&cam, parameters());
        let result = search.track(map.frame_pair_mut(previous, current).unwrap(), &mut grid);
        assert_eq!(result.lost_points.len(), 1);

        grid.insert(point_at(current_id, 55, 52, 5));
        let recovered = search.recover(
            &result.lost_points,
            map.frame_pair_mut(previous, current).unwrap(),
            &mut grid,
        );
        assert_eq!(recovered, 1);

        let point = &map.frame(current).unwrap().points[0];
        assert_eq!(point.track_length, 5);
        assert_eq!(point.landmark, Some(LandmarkId::new(1)));
    }
}
