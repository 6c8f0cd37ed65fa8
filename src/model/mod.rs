// src/model/mod.rs
//! Data model: positions, calibration points, regions, layers and events

pub mod calibration;
pub mod events;
pub mod layer;
pub mod position;
pub mod region;

pub use calibration::CalibrationPoint;
pub use events::{PositionEvent, PositionFix, RaidStartEvent};
pub use layer::{MapConfig, MapLayer, RegionState};
pub use position::Position3D;
pub use region::Region;
