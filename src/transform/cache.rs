// src/transform/cache.rs
//! Memoization of solved transforms with FIFO eviction and per-key
//! single-flight computation

use super::affine::CoordinateTransform;
use crate::error::Result;
use crate::model::Position3D;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// Default bound on cached transforms.
pub const DEFAULT_CAPACITY: usize = 50;
/// Default quantization grid for query positions, in world units. Small
/// player movement within a cell reuses the cached locality fit.
pub const DEFAULT_CELL_SIZE: f64 = 10.0;

/// Cache key: map, layer, and the quantized horizontal query cell (absent
/// for global, query-less fits).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    map_id: String,
    layer_id: i32,
    cell: Option<(i64, i64)>,
}

#[derive(Default)]
struct CacheInner {
    entries: HashMap<CacheKey, CoordinateTransform>,
    /// Insertion order for FIFO eviction.
    order: VecDeque<CacheKey>,
    hits: u64,
    misses: u64,
}

/// Bounded transform cache shared between the position-event path and the
/// calibration-editing path.
///
/// Eviction is FIFO by insertion order rather than strict LRU; that keeps
/// the hot path to one hash lookup, at the cost of possible recompute
/// churn when calibration is edited under heavy map switching.
pub struct TransformCache {
    inner: Mutex<CacheInner>,
    /// One lock per key with a computation in flight, so concurrent
    /// callers never run the solver twice for the same key. Removed when
    /// the computation finishes; waiters holding a clone still serialize
    /// on it and then hit the cache.
    locks: Mutex<HashMap<CacheKey, Arc<Mutex<()>>>>,
    capacity: usize,
    cell_size: f64,
}

impl TransformCache {
    pub fn new() -> Self {
        Self::with_settings(DEFAULT_CAPACITY, DEFAULT_CELL_SIZE)
    }

    pub fn with_settings(capacity: usize, cell_size: f64) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            locks: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
            cell_size: if cell_size > 0.0 { cell_size } else { DEFAULT_CELL_SIZE },
        }
    }

    /// Build the cache key for a lookup, quantizing the query position to
    /// the cache's grid.
    pub fn key(&self, map_id: &str, layer_id: i32, query: Option<&Position3D>) -> CacheKey {
        CacheKey {
            map_id: map_id.to_string(),
            layer_id,
            cell: query.map(|p| {
                (
                    (p.x / self.cell_size).round() as i64,
                    (p.z / self.cell_size).round() as i64,
                )
            }),
        }
    }

    /// Return the cached transform for `key`, or run `compute` and cache
    /// its success. Failures propagate and are never cached, so the next
    /// caller retries. Computation is serialized per key.
    pub fn get_or_compute<F>(&self, key: CacheKey, compute: F) -> Result<CoordinateTransform>
    where
        F: FnOnce() -> Result<CoordinateTransform>,
    {
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        let key_lock = {
            let mut locks = self.locks.lock().unwrap();
            Arc::clone(locks.entry(key.clone()).or_default())
        };
        let _guard = key_lock.lock().unwrap();

        // A concurrent caller may have computed it while we waited.
        if let Some(hit) = self.lookup(&key) {
            return Ok(hit);
        }

        let computed = compute();

        if let Ok(transform) = &computed {
            let mut inner = self.inner.lock().unwrap();
            inner.misses += 1;
            if !inner.entries.contains_key(&key) {
                while inner.entries.len() >= self.capacity {
                    if let Some(oldest) = inner.order.pop_front() {
                        inner.entries.remove(&oldest);
                        debug!(?oldest, "evicted cached transform");
                    } else {
                        break;
                    }
                }
                inner.order.push_back(key.clone());
                inner.entries.insert(key.clone(), *transform);
            }
        }

        // The lock only guards the in-flight computation. Dropping it here
        // keeps the lock map bounded by concurrency, not by distinct keys.
        self.locks.lock().unwrap().remove(&key);

        computed
    }

    fn lookup(&self, key: &CacheKey) -> Option<CoordinateTransform> {
        let mut inner = self.inner.lock().unwrap();
        match inner.entries.get(key).copied() {
            Some(t) => {
                inner.hits += 1;
                Some(t)
            }
            None => None,
        }
    }

    /// Drop every cached entry for one (map, layer) pair. Must be called
    /// after any calibration-point change on that layer; region edits do
    /// not affect transforms and need no invalidation.
    pub fn invalidate(&self, map_id: &str, layer_id: i32) {
        let matches = |k: &CacheKey| k.map_id == map_id && k.layer_id == layer_id;

        let mut inner = self.inner.lock().unwrap();
        let before = inner.entries.len();
        inner.entries.retain(|k, _| !matches(k));
        inner.order.retain(|k| !matches(k));
        let removed = before - inner.entries.len();
        drop(inner);

        self.locks.lock().unwrap().retain(|k, _| !matches(k));

        if removed > 0 {
            debug!(map_id, layer_id, removed, "invalidated cached transforms");
        }
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.order.clear();
        drop(inner);
        self.locks.lock().unwrap().clear();
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock().unwrap();
        CacheStats {
            entries: inner.entries.len(),
            capacity: self.capacity,
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

impl Default for TransformCache {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
}
