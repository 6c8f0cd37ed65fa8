// src/transform/mod.rs
//! Affine transform fitting and caching

pub mod affine;
pub mod cache;
pub mod solver;

pub use affine::CoordinateTransform;
pub use cache::{CacheStats, TransformCache};
pub use solver::{fit_transform, SolverOptions};
