// src/transform/affine.rs
//! 2D affine transform from game-world to map-pixel coordinates

use crate::model::Position3D;

/// An immutable 6-parameter affine map:
///
/// ```text
/// map_x = a * game_x + b * game_z + c
/// map_y = d * game_x + e * game_z + f
/// ```
///
/// The coefficients already encode rotation, scale, shear and translation.
/// `scale_x`, `scale_z` and `rotation` are derived for display purposes
/// only and are never folded back into the coefficients.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CoordinateTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub e: f64,
    pub f: f64,
    pub scale_x: f64,
    pub scale_z: f64,
    pub rotation: f64,
}

impl CoordinateTransform {
    /// Build a transform from raw coefficients, deriving the display-only
    /// geometric parameters.
    pub fn from_coefficients(a: f64, b: f64, c: f64, d: f64, e: f64, f: f64) -> Self {
        Self {
            a,
            b,
            c,
            d,
            e,
            f,
            scale_x: (a * a + d * d).sqrt(),
            scale_z: (b * b + e * e).sqrt(),
            rotation: d.atan2(a),
        }
    }

    /// Map a game-world position to map-pixel coordinates. Height is
    /// ignored; the transform lives in the horizontal plane.
    pub fn apply(&self, game_pos: &Position3D) -> (f64, f64) {
        let map_x = self.a * game_pos.x + self.b * game_pos.z + self.c;
        let map_y = self.d * game_pos.x + self.e * game_pos.z + self.f;
        (map_x, map_y)
    }

    /// Planar distance between the predicted pixel and a recorded one.
    pub fn reprojection_error(&self, game_pos: &Position3D, map_x: f64, map_y: f64) -> f64 {
        let (px, py) = self.apply(game_pos);
        ((px - map_x).powi(2) + (py - map_y).powi(2)).sqrt()
    }
}
