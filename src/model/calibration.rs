// src/model/calibration.rs
//! Calibration correspondences between world and map-pixel coordinates

use super::position::Position3D;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A user-supplied correspondence between a game-world coordinate and a
/// pixel location on a map image. Immutable once created; correction means
/// removing the point and adding a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub game_pos: Position3D,
    pub map_x: f64,
    pub map_y: f64,
    pub timestamp: DateTime<Utc>,
}

impl CalibrationPoint {
    pub fn new(game_pos: Position3D, map_x: f64, map_y: f64) -> Self {
        Self {
            game_pos,
            map_x,
            map_y,
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for CalibrationPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Game{} -> Map({:.1}, {:.1})",
            self.game_pos, self.map_x, self.map_y
        )
    }
}
