//! Per-frame tracking results and accumulated statistics.
//!
//! A [`TrackingResult`] is produced by every tracking cycle and carries the
//! counts of each phase (correspondence, refinement, pruning, recovery,
//! landmark update, admission). [`TrackerStats`] sums them over a run.

use crate::geometry::SE3;
use crate::map::{FrameId, LandmarkUpdate};

use super::TrackingState;

/// Summary of one tracking cycle.
#[derive(Debug, Clone)]
pub struct TrackingResult {
    pub frame: FrameId,
    /// State after the cycle.
    pub state: TrackingState,
    pub robot_to_world: SE3,
    /// The cycle ended in a track loss.
    pub track_lost: bool,
    /// The refined pose was rejected as insignificant motion.
    pub pose_retained: bool,

    pub potential_points: usize,
    pub tracked_points: usize,
    pub tracked_landmarks_close: usize,
    pub tracked_landmarks_far: usize,
    pub lost_points: usize,
    pub recovered_points: usize,

    pub inliers: usize,
    pub outliers: usize,
    pub average_error: f64,
    pub pruned_points: usize,

    pub landmarks: LandmarkUpdate,
    pub new_points: usize,
}

impl TrackingResult {
    pub(crate) fn new(frame: FrameId, state: TrackingState, robot_to_world: SE3) -> Self {
        Self {
            frame,
            state,
            robot_to_world,
            track_lost: false,
            pose_retained: false,
            potential_points: 0,
            tracked_points: 0,
            tracked_landmarks_close: 0,
            tracked_landmarks_far: 0,
            lost_points: 0,
            recovered_points: 0,
            inliers: 0,
            outliers: 0,
            average_error: 0.0,
            pruned_points: 0,
            landmarks: LandmarkUpdate::default(),
            new_points: 0,
        }
    }
}

/// Totals over all processed frames.
#[derive(Debug, Default, Clone)]
pub struct TrackerStats {
    pub frames: usize,
    pub frames_tracking: usize,
    pub track_losses: usize,
    pub total_tracked_points: usize,
    pub total_landmarks_close: usize,
    pub total_landmarks_far: usize,
    pub total_recovered_points: usize,
    pub total_created_landmarks: usize,
}

impl TrackerStats {
    /// Count one cycle. A cycle that lost the track only counts as a frame
    /// and a loss; its point totals are dropped.
    pub fn record(&mut self, result: &TrackingResult) {
        self.frames += 1;
        if result.track_lost {
            self.track_losses += 1;
            return;
        }
        if result.state.is_tracking() {
            self.frames_tracking += 1;
        }
        self.total_tracked_points += result.tracked_points;
        self.total_landmarks_close += result.tracked_landmarks_close;
        self.total_landmarks_far += result.tracked_landmarks_far;
        self.total_recovered_points += result.recovered_points;
        self.total_created_landmarks += result.landmarks.created;
    }

    /// Average tracked points per frame.
    pub fn average_tracked_points(&self) -> f64 {
        if self.frames == 0 {
            0.0
        } else {
            self.total_tracked_points as f64 / self.frames as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn tracked(state: TrackingState, points: usize) -> TrackingResult {
        let mut result = TrackingResult::new(FrameId::new(0), state, SE3::identity());
        result.tracked_points = points;
        result.tracked_landmarks_close = points;
        result.recovered_points = 2;
        result.landmarks.created = 1;
        result
    }

    #[test]
    fn test_record_sums_completed_cycles() {
        let mut stats = TrackerStats::default();
        stats.record(&tracked(TrackingState::Localizing, 10));
        stats.record(&tracked(TrackingState::Tracking, 20));

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.frames_tracking, 1);
        assert_eq!(stats.total_tracked_points, 30);
        assert_eq!(stats.total_landmarks_close, 30);
        assert_eq!(stats.total_recovered_points, 4);
        assert_eq!(stats.total_created_landmarks, 2);
        assert_relative_eq!(stats.average_tracked_points(), 15.0);
    }

    #[test]
    fn test_record_skips_totals_of_lost_cycle() {
        let mut stats = TrackerStats::default();
        stats.record(&tracked(TrackingState::Tracking, 20));

        let mut lost = tracked(TrackingState::Localizing, 24);
        lost.track_lost = true;
        stats.record(&lost);

        assert_eq!(stats.frames, 2);
        assert_eq!(stats.frames_tracking, 1);
        assert_eq!(stats.track_losses, 1);
        assert_eq!(stats.total_tracked_points, 20);
        assert_eq!(stats.total_landmarks_close, 20);
        assert_eq!(stats.total_recovered_points, 2);
        assert_eq!(stats.total_created_landmarks, 1);
    }
}
