// src/model/events.rs
//! Typed events produced by external watchers (screenshot/log parsers)

use super::position::Position3D;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parsed player position update. Producers guarantee well-formed values;
/// malformed upstream data never reaches this crate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEvent {
    pub position: Position3D,
    pub yaw_degrees: f64,
    pub map_id: String,
    pub timestamp: DateTime<Utc>,
}

/// A raid has started on the given map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaidStartEvent {
    pub map_id: String,
}

/// The outcome of processing one position event: which layer to show and,
/// when that layer is calibrated, where on its image the player sits.
#[derive(Debug, Clone, PartialEq)]
pub struct PositionFix {
    pub layer_id: i32,
    /// Pixel position on the active layer's image. Absent when the active
    /// layer has no usable transform.
    pub map_pos: Option<(f64, f64)>,
    /// Player yaw plus the active layer's display rotation offset.
    pub heading_degrees: f64,
}
