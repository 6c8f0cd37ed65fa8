// src/error.rs
//! Error types for the map locator

use std::fmt;

pub type Result<T> = std::result::Result<T, MapError>;

#[derive(Debug)]
pub enum MapError {
    Io(std::io::Error),
    Json(serde_json::Error),
    /// Collinear or insufficient calibration points. Never degrades to a
    /// silent identity transform.
    DegenerateCalibration(String),
    /// A candidate region has fewer than 3 boundary points.
    InvalidRegion(String),
    /// A candidate region geometrically intersects a region owned by
    /// another layer on the same map.
    RegionOverlap { layer_id: i32, message: String },
    /// Two layers with identical region geometry have overlapping height
    /// ranges.
    HeightRangeConflict { layer_id: i32, message: String },
    LayerNotFound(i32),
    MapNotFound(String),
    BaseMapMissing(String),
    BaseMapDuplicate { map_id: String, count: usize },
    Other(String),
}

impl fmt::Display for MapError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapError::Io(e) => write!(f, "IO error: {}", e),
            MapError::Json(e) => write!(f, "JSON error: {}", e),
            MapError::DegenerateCalibration(msg) => {
                write!(f, "Degenerate calibration: {}", msg)
            }
            MapError::InvalidRegion(msg) => write!(f, "Invalid region: {}", msg),
            MapError::RegionOverlap { layer_id, message } => {
                write!(f, "Region overlaps layer {}: {}", layer_id, message)
            }
            MapError::HeightRangeConflict { layer_id, message } => {
                write!(f, "Height range conflicts with layer {}: {}", layer_id, message)
            }
            MapError::LayerNotFound(id) => write!(f, "Layer {} not found", id),
            MapError::MapNotFound(id) => write!(f, "Map '{}' not found", id),
            MapError::BaseMapMissing(id) => write!(f, "Map '{}' has no base layer", id),
            MapError::BaseMapDuplicate { map_id, count } => {
                write!(f, "Map '{}' has {} base layers, expected exactly 1", map_id, count)
            }
            MapError::Other(msg) => write!(f, "Error: {}", msg),
        }
    }
}

impl std::error::Error for MapError {}

impl From<std::io::Error> for MapError {
    fn from(error: std::io::Error) -> Self {
        MapError::Io(error)
    }
}

impl From<serde_json::Error> for MapError {
    fn from(error: serde_json::Error) -> Self {
        MapError::Json(error)
    }
}

impl From<anyhow::Error> for MapError {
    fn from(error: anyhow::Error) -> Self {
        MapError::Other(error.to_string())
    }
}
