//! Map data structures: frames, points, landmarks, local maps and the
//! owning WorldMap.

pub mod frame;
pub mod frame_point;
pub mod landmark;
pub mod local_map;
pub mod types;
pub mod world_map;

pub use frame::{Frame, FrameStatus};
pub use frame_point::{Descriptor, FramePoint, GridCell, DESCRIPTOR_BYTES};
pub use landmark::{FusionOutcome, Landmark, LandmarkFusion, LandmarkFusionConfig, WeightedMeanFusion};
pub use local_map::{LandmarkItem, LocalMap, LoopClosure};
pub use types::{FrameId, FramePointRef, LandmarkId, LocalMapId};
pub use world_map::{FramePair, LandmarkUpdate, WorldMap, WorldMapConfig};
