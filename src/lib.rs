// src/lib.rs
//! Map Locator Library
//!
//! Locates a player on pre-calibrated multi-layer map images: affine
//! transform fitting from calibration points, polygon regions for layer
//! activation, and a cached solver pipeline.

pub mod error;
pub mod model;
pub mod resolver;
pub mod session;
pub mod store;
pub mod transform;

// Re-export main types for convenience
pub use error::{MapError, Result};
pub use model::{MapConfig, MapLayer, Position3D, Region, RegionState};
pub use resolver::resolve_active_layer;
pub use session::MapSession;
pub use store::MapStore;
pub use transform::{CoordinateTransform, SolverOptions, TransformCache};
