//! WorldMap - owning registry of frames, landmarks and local maps.
//!
//! Frames live in an arena indexed by [`FrameId`], landmarks in a
//! map keyed by [`LandmarkId`]. Everything else (points, local maps, the
//! tracker) refers to them by id, and only the WorldMap removes entries.
//!
//! The map also segments the trajectory into local maps: translation and
//! rotation are accumulated frame by frame and a local map is closed once
//! either exceeds its threshold and enough frames were collected.

use std::collections::{HashMap, HashSet};

use nalgebra::Vector3;
use serde::Deserialize;

use crate::error::{Result, SlamError};
use crate::geometry::SE3;

use super::frame::Frame;
use super::landmark::{FusionOutcome, Landmark, LandmarkFusion};
use super::local_map::{LandmarkItem, LocalMap};
use super::types::{FrameId, FramePointRef, LandmarkId, LocalMapId};

/// Configuration for local map segmentation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WorldMapConfig {
    /// Translation (m) since the last local map that allows a new one.
    pub minimum_distance_traveled_for_local_map: f64,

    /// Rotation (rad) since the last local map that allows a new one.
    pub minimum_degrees_rotated_for_local_map: f64,

    /// Frames required in the window before a local map can be created.
    pub minimum_number_of_frames_for_local_map: usize,
}

impl Default for WorldMapConfig {
    fn default() -> Self {
        Self {
            minimum_distance_traveled_for_local_map: 0.5,
            minimum_degrees_rotated_for_local_map: 0.5,
            minimum_number_of_frames_for_local_map: 4,
        }
    }
}

/// Counts produced by one landmark update pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkUpdate {
    pub created: usize,
    pub fused: usize,
    pub rejected: usize,
    pub reset: usize,
}

impl LandmarkUpdate {
    pub fn tracked(&self) -> usize {
        self.fused + self.rejected + self.reset
    }
}

/// Pair of consecutive frames borrowed for correspondence search.
pub struct FramePair<'a> {
    pub previous: &'a Frame,
    pub current: &'a mut Frame,
    pub landmarks: &'a HashMap<LandmarkId, Landmark>,
}

/// The world map.
pub struct WorldMap {
    config: WorldMapConfig,

    /// Frame arena; `FrameId(n)` lives at index `n`.
    frames: Vec<Frame>,
    landmarks: HashMap<LandmarkId, Landmark>,
    local_maps: Vec<LocalMap>,

    next_landmark_id: u64,

    root_frame: Option<FrameId>,
    current_frame: Option<FrameId>,
    previous_frame: Option<FrameId>,
    current_local_map: Option<LocalMapId>,

    /// Latest robot pose estimate.
    robot_to_world: SE3,

    /// Pose before the latest loop closure, for downstream consumers.
    last_good_robot_pose: SE3,
    relocalized: bool,

    /// Landmarks tracked in the current frame.
    currently_tracked_landmarks: Vec<LandmarkId>,

    // Local map accumulation window.
    distance_traveled_window: f64,
    degrees_rotated_window: f64,
    frame_queue_for_local_map: Vec<FrameId>,
}

impl WorldMap {
    pub fn new(config: WorldMapConfig) -> Self {
        Self {
            config,
            frames: Vec::new(),
            landmarks: HashMap::new(),
            local_maps: Vec::new(),
            next_landmark_id: 0,
            root_frame: None,
            current_frame: None,
            previous_frame: None,
            current_local_map: None,
            robot_to_world: SE3::identity(),
            last_good_robot_pose: SE3::identity(),
            relocalized: false,
            currently_tracked_landmarks: Vec::new(),
            distance_traveled_window: 0.0,
            degrees_rotated_window: 0.0,
            frame_queue_for_local_map: Vec::new(),
        }
    }

    pub fn config(&self) -> &WorldMapConfig {
        &self.config
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Pose
    // ─────────────────────────────────────────────────────────────────────────

    pub fn robot_to_world(&self) -> SE3 {
        self.robot_to_world
    }

    pub fn set_robot_to_world(&mut self, robot_to_world: SE3) {
        self.robot_to_world = robot_to_world;
    }

    pub fn last_good_robot_pose(&self) -> SE3 {
        self.last_good_robot_pose
    }

    pub fn set_last_good_robot_pose(&mut self, robot_to_world: SE3) {
        self.last_good_robot_pose = robot_to_world;
    }

    pub fn relocalized(&self) -> bool {
        self.relocalized
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Frames
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a new current frame at `robot_to_world` and chain it after the
    /// previous current frame.
    ///
    /// The frame joins the local map queue; its motion is added to the window
    /// by [`WorldMap::accumulate_window`] once its pose is final.
    pub fn create_frame(&mut self, timestamp: f64, robot_to_world: SE3) -> FrameId {
        let id = FrameId::new(self.frames.len() as u64);
        let previous = self.current_frame;

        if let Some(previous_id) = previous {
            self.frames[previous_id.0 as usize].next = Some(id);
        } else if self.root_frame.is_none() {
            self.root_frame = Some(id);
        }

        self.frames.push(Frame::new(id, timestamp, robot_to_world, previous));
        self.frame_queue_for_local_map.push(id);
        self.previous_frame = previous;
        self.current_frame = Some(id);
        self.robot_to_world = robot_to_world;
        id
    }

    /// Add the motion from the previous frame to `frame_id` to the local map
    /// window.
    pub fn accumulate_window(&mut self, frame_id: FrameId) -> Result<()> {
        let frame = self.try_frame(frame_id)?;
        let Some(previous_id) = frame.previous else {
            return Ok(());
        };
        let motion = self.try_frame(previous_id)?.robot_to_world.inverse() * frame.robot_to_world;
        self.distance_traveled_window += motion.translation_norm();
        self.degrees_rotated_window += motion.rotation_angle();
        Ok(())
    }

    /// Remove the newest frame again and make `robot_to_world` the latest
    /// pose.
    ///
    /// Undoes [`WorldMap::create_frame`] for a frame that never got its
    /// features. Only the current frame can be discarded.
    pub fn discard_frame(&mut self, frame_id: FrameId, robot_to_world: SE3) -> Result<()> {
        if self.current_frame != Some(frame_id) || frame_id.0 as usize + 1 != self.frames.len() {
            return Err(SlamError::UnknownFrame(frame_id));
        }
        let Some(frame) = self.frames.pop() else {
            return Err(SlamError::UnknownFrame(frame_id));
        };

        self.previous_frame = match frame.previous {
            Some(previous_id) => {
                let previous = &mut self.frames[previous_id.0 as usize];
                previous.next = None;
                previous.previous
            }
            None => None,
        };
        self.current_frame = frame.previous;
        if self.root_frame == Some(frame_id) {
            self.root_frame = None;
        }
        if self.frame_queue_for_local_map.last() == Some(&frame_id) {
            self.frame_queue_for_local_map.pop();
        }
        self.robot_to_world = robot_to_world;
        Ok(())
    }

    pub fn frame(&self, id: FrameId) -> Option<&Frame> {
        self.frames.get(id.0 as usize)
    }

    pub fn frame_mut(&mut self, id: FrameId) -> Option<&mut Frame> {
        self.frames.get_mut(id.0 as usize)
    }

    pub fn try_frame(&self, id: FrameId) -> Result<&Frame> {
        self.frame(id).ok_or(SlamError::UnknownFrame(id))
    }

    pub fn try_frame_mut(&mut self, id: FrameId) -> Result<&mut Frame> {
        self.frame_mut(id).ok_or(SlamError::UnknownFrame(id))
    }

    /// Borrow two frames for correspondence search, `previous` read-only.
    pub fn frame_pair_mut(&mut self, previous: FrameId, current: FrameId) -> Result<FramePair<'_>> {
        let previous_index = previous.0 as usize;
        let current_index = current.0 as usize;
        if current_index >= self.frames.len() {
            return Err(SlamError::UnknownFrame(current));
        }
        if previous_index >= current_index {
            return Err(SlamError::UnknownFrame(previous));
        }

        let (head, tail) = self.frames.split_at_mut(current_index);
        Ok(FramePair {
            previous: &head[previous_index],
            current: &mut tail[0],
            landmarks: &self.landmarks,
        })
    }

    pub fn frames(&self) -> impl Iterator<Item = &Frame> {
        self.frames.iter()
    }

    pub fn num_frames(&self) -> usize {
        self.frames.len()
    }

    pub fn root_frame_id(&self) -> Option<FrameId> {
        self.root_frame
    }

    pub fn current_frame_id(&self) -> Option<FrameId> {
        self.current_frame
    }

    pub fn previous_frame_id(&self) -> Option<FrameId> {
        self.previous_frame
    }

    pub fn current_frame(&self) -> Option<&Frame> {
        self.current_frame.and_then(|id| self.frame(id))
    }

    pub fn previous_frame(&self) -> Option<&Frame> {
        self.previous_frame.and_then(|id| self.frame(id))
    }

    /// Walk a point's track backwards, starting with the point itself.
    pub fn track_chain(&self, start: FramePointRef) -> Vec<FramePointRef> {
        let mut chain = Vec::new();
        let mut cursor = Some(start);
        while let Some(reference) = cursor {
            let Some(point) = self
                .frame(reference.frame)
                .and_then(|frame| frame.points.get(reference.index))
            else {
                break;
            };
            chain.push(reference);
            cursor = point.previous;
        }
        chain
    }

    /// Timestamped robot poses in trajectory order.
    pub fn trajectory(&self) -> Vec<(f64, SE3)> {
        self.frames
            .iter()
            .map(|frame| (frame.timestamp, frame.robot_to_world))
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Landmarks
    // ─────────────────────────────────────────────────────────────────────────

    /// Register a new landmark created from the point at `origin`.
    pub fn create_landmark(&mut self, origin: FramePointRef, coordinates: Vector3<f64>) -> LandmarkId {
        let id = LandmarkId::new(self.next_landmark_id);
        self.next_landmark_id += 1;
        self.landmarks.insert(id, Landmark::new(id, origin, coordinates));
        id
    }

    pub fn landmark(&self, id: LandmarkId) -> Option<&Landmark> {
        self.landmarks.get(&id)
    }

    pub fn landmark_mut(&mut self, id: LandmarkId) -> Option<&mut Landmark> {
        self.landmarks.get_mut(&id)
    }

    pub fn landmarks(&self) -> impl Iterator<Item = &Landmark> {
        self.landmarks.values()
    }

    /// Landmark lookup table, as handed to the pose solver.
    pub fn landmark_map(&self) -> &HashMap<LandmarkId, Landmark> {
        &self.landmarks
    }

    pub fn num_landmarks(&self) -> usize {
        self.landmarks.len()
    }

    pub fn currently_tracked_landmarks(&self) -> &[LandmarkId] {
        &self.currently_tracked_landmarks
    }

    /// Mark every tracked landmark as not tracked and empty the tracked set.
    pub fn reset_tracked_landmarks(&mut self) {
        for id in self.currently_tracked_landmarks.drain(..) {
            if let Some(landmark) = self.landmarks.get_mut(&id) {
                landmark.is_currently_tracked = false;
            }
        }
    }

    /// Create or refine the landmarks observed by the points of `frame_id`.
    ///
    /// Every point's world coordinates are refreshed from the frame pose.
    /// Points whose track is shorter than `minimum_track_length` are skipped;
    /// the others get a landmark if they have none, fuse their observation
    /// into it and mark it as currently tracked.
    pub fn update_landmarks(
        &mut self,
        frame_id: FrameId,
        minimum_track_length: usize,
        fusion: &dyn LandmarkFusion,
    ) -> Result<LandmarkUpdate> {
        let index = frame_id.0 as usize;
        let frame = self
            .frames
            .get_mut(index)
            .ok_or(SlamError::UnknownFrame(frame_id))?;
        let robot_to_world = frame.robot_to_world;

        let mut update = LandmarkUpdate::default();
        let mut seen = HashSet::new();

        for (point_index, point) in frame.points.iter_mut().enumerate() {
            point.world_coordinates = robot_to_world.transform_point(&point.robot_coordinates);
            if point.track_length < minimum_track_length {
                continue;
            }

            let existing = point.landmark.filter(|id| self.landmarks.contains_key(id));
            let landmark_id = match existing {
                Some(id) => id,
                None => {
                    let id = LandmarkId::new(self.next_landmark_id);
                    self.next_landmark_id += 1;
                    let origin = FramePointRef::new(frame_id, point_index);
                    self.landmarks
                        .insert(id, Landmark::new(id, origin, point.world_coordinates));
                    point.landmark = Some(id);
                    update.created += 1;
                    id
                }
            };

            assert!(
                seen.insert(landmark_id),
                "landmark {} attached to two tracks in frame {}",
                landmark_id,
                frame_id
            );

            let Some(landmark) = self.landmarks.get_mut(&landmark_id) else {
                continue;
            };
            landmark.is_near = point.is_near;
            match fusion.fuse(landmark, point) {
                FusionOutcome::Accepted => update.fused += 1,
                FusionOutcome::Rejected => update.rejected += 1,
                FusionOutcome::Reset => update.reset += 1,
            }
            landmark.is_currently_tracked = true;
            self.currently_tracked_landmarks.push(landmark_id);
        }

        Ok(update)
    }

    /// Remove landmarks that are not validated, not tracked and not part of
    /// any local map. Point references to removed landmarks are cleared.
    ///
    /// Returns the number of removed landmarks.
    pub fn purify_landmarks(&mut self) -> usize {
        let in_local_maps: HashSet<LandmarkId> = self
            .local_maps
            .iter()
            .flat_map(|local_map| local_map.items.iter().map(|item| item.landmark))
            .collect();

        let removed: HashSet<LandmarkId> = self
            .landmarks
            .values()
            .filter(|landmark| {
                !landmark.are_coordinates_validated
                    && !landmark.is_currently_tracked
                    && !in_local_maps.contains(&landmark.id)
            })
            .map(|landmark| landmark.id)
            .collect();

        if removed.is_empty() {
            return 0;
        }

        self.landmarks.retain(|id, _| !removed.contains(id));
        for frame in &mut self.frames {
            for point in &mut frame.points {
                if point.landmark.is_some_and(|id| removed.contains(&id)) {
                    point.landmark = None;
                }
            }
        }

        tracing::debug!("Purified {} landmarks", removed.len());
        removed.len()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Local maps
    // ─────────────────────────────────────────────────────────────────────────

    /// Close the current window into a local map if it moved far enough.
    ///
    /// Returns the id of the new local map, or `None` when the window does not
    /// qualify yet.
    pub fn create_local_map(&mut self) -> Option<LocalMapId> {
        let anchor_id = self.current_frame?;

        let moved = self.distance_traveled_window >= self.config.minimum_distance_traveled_for_local_map
            || self.degrees_rotated_window >= self.config.minimum_degrees_rotated_for_local_map;
        if !moved
            || self.frame_queue_for_local_map.len() < self.config.minimum_number_of_frames_for_local_map
        {
            return None;
        }

        let anchor = &self.frames[anchor_id.0 as usize];
        let local_map_to_world = anchor.robot_to_world;
        let world_to_local_map = local_map_to_world.inverse();

        let tracked: HashSet<LandmarkId> = self.currently_tracked_landmarks.iter().copied().collect();
        let mut added = HashSet::new();
        let mut items = Vec::new();
        for point in &anchor.points {
            let Some(landmark_id) = point.landmark else {
                continue;
            };
            if !tracked.contains(&landmark_id) || !added.insert(landmark_id) {
                continue;
            }
            if let Some(landmark) = self.landmarks.get(&landmark_id) {
                items.push(LandmarkItem {
                    landmark: landmark_id,
                    descriptor: point.descriptor,
                    coordinates: world_to_local_map.transform_point(&landmark.coordinates),
                });
            }
        }

        let id = LocalMapId::new(self.local_maps.len() as u64);
        let frames = std::mem::take(&mut self.frame_queue_for_local_map);
        for frame_id in &frames {
            self.frames[frame_id.0 as usize].local_map = Some(id);
        }

        let previous = self.current_local_map;
        if let Some(previous_id) = previous {
            self.local_maps[previous_id.0 as usize].next = Some(id);
        }

        tracing::info!(
            "Created local map {} with {} frames, {} landmarks (distance {:.3}, rotation {:.3})",
            id,
            frames.len(),
            items.len(),
            self.distance_traveled_window,
            self.degrees_rotated_window
        );

        self.local_maps
            .push(LocalMap::new(id, frames, local_map_to_world, items, previous));
        self.current_local_map = Some(id);
        self.distance_traveled_window = 0.0;
        self.degrees_rotated_window = 0.0;
        Some(id)
    }

    /// Record a confirmed loop closure between two local maps.
    ///
    /// Only the relative alignment is stored; no poses are re-optimized.
    pub fn close_local_maps(
        &mut self,
        query: LocalMapId,
        reference: LocalMapId,
        query_to_reference: SE3,
    ) -> Result<()> {
        if self.local_map(reference).is_none() {
            return Err(SlamError::UnknownLocalMap(reference));
        }
        let query_map = self
            .local_maps
            .get_mut(query.0 as usize)
            .ok_or(SlamError::UnknownLocalMap(query))?;
        query_map.add_closure(reference, query_to_reference);

        self.last_good_robot_pose = self.robot_to_world;
        self.relocalized = true;
        tracing::info!("Closed local map {} against {}", query, reference);
        Ok(())
    }

    /// Drop the local map accumulation window.
    pub fn reset_window(&mut self) {
        self.distance_traveled_window = 0.0;
        self.degrees_rotated_window = 0.0;
        self.frame_queue_for_local_map.clear();
    }

    pub fn local_map(&self, id: LocalMapId) -> Option<&LocalMap> {
        self.local_maps.get(id.0 as usize)
    }

    pub fn local_map_mut(&mut self, id: LocalMapId) -> Option<&mut LocalMap> {
        self.local_maps.get_mut(id.0 as usize)
    }

    pub fn local_maps(&self) -> &[LocalMap] {
        &self.local_maps
    }

    pub fn num_local_maps(&self) -> usize {
        self.local_maps.len()
    }

    pub fn current_local_map_id(&self) -> Option<LocalMapId> {
        self.current_local_map
    }

    pub fn frame_queue_for_local_map(&self) -> &[FrameId] {
        &self.frame_queue_for_local_map
    }

    pub fn distance_traveled_window(&self) -> f64 {
        self.distance_traveled_window
    }

    pub fn degrees_rotated_window(&self) -> f64 {
        self.degrees_rotated_window
    }

    /// Empty the map.
    pub fn clear(&mut self) {
        self.frames.clear();
        self.landmarks.clear();
        self.local_maps.clear();
        self.next_landmark_id = 0;
        self.root_frame = None;
        self.current_frame = None;
        self.previous_frame = None;
        self.current_local_map = None;
        self.robot_to_world = SE3::identity();
        self.last_good_robot_pose = SE3::identity();
        self.relocalized = false;
        self.currently_tracked_landmarks.clear();
        self.reset_window();
    }
}

impl Default for WorldMap {
    fn default() -> Self {
        Self::new(WorldMapConfig::default())
    }
}

impl std::fmt::Debug for WorldMap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorldMap")
            .field("num_frames", &self.frames.len())
            .field("num_landmarks", &self.landmarks.len())
            .field("num_local_maps", &self.local_maps.len())
            .finish()
    }
}
