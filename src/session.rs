// src/session.rs
//! Ties the store, solver and cache together into one tracking session

use crate::error::{MapError, Result};
use crate::model::{
    MapConfig, PositionEvent, PositionFix, Position3D, RaidStartEvent, Region,
};
use crate::resolver::resolve_active_layer;
use crate::store::MapStore;
use crate::transform::{fit_transform, SolverOptions, TransformCache};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// A live tracking session over one map-set.
///
/// Owns the configuration store, the transform cache and the solver RNG.
/// Every calibration mutation goes through this type so the cache can be
/// invalidated in the same call; region mutations deliberately skip
/// invalidation because regions never feed the solver.
pub struct MapSession {
    store: MapStore,
    cache: TransformCache,
    options: SolverOptions,
    rng: Mutex<ChaCha8Rng>,
    current_map: Option<String>,
}

impl MapSession {
    pub fn new(store: MapStore) -> Self {
        Self::with_seed(store, 0)
    }

    /// A session whose RANSAC draws are reproducible for the given seed.
    pub fn with_seed(store: MapStore, seed: u64) -> Self {
        Self {
            store,
            cache: TransformCache::new(),
            options: SolverOptions::default(),
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            current_map: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self::new(MapStore::load(path)?))
    }

    pub fn store(&self) -> &MapStore {
        &self.store
    }

    pub fn config(&self, map_id: &str) -> Result<&MapConfig> {
        self.store.map(map_id)
    }

    pub fn save(&self) -> Result<()> {
        self.store.save()
    }

    /// Project a game-world position onto a layer's image, in pixels.
    ///
    /// Transforms are served from the cache keyed by map, layer and the
    /// quantized query cell; misses run the solver under a per-key lock so
    /// concurrent callers for the same key compute at most once.
    pub fn transform(
        &self,
        map_id: &str,
        layer_id: i32,
        game_pos: &Position3D,
    ) -> Result<(f64, f64)> {
        let config = self.store.map(map_id)?;
        let layer = config
            .layer_by_id(layer_id)
            .ok_or(MapError::LayerNotFound(layer_id))?;

        let query = self.options.use_locality.then_some(game_pos);
        let key = self.cache.key(map_id, layer_id, query);
        let transform = self.cache.get_or_compute(key, || {
            debug!(map_id, layer_id, "fitting transform");
            let mut rng = self.rng.lock().unwrap();
            fit_transform(&layer.calibration_points, query, &self.options, &mut *rng)
        })?;

        Ok(transform.apply(game_pos))
    }

    /// Resolve which layer the player is on right now.
    ///
    /// Region activation needs the player's position in base-map pixels; if
    /// the base layer has no usable transform, resolution proceeds on
    /// height alone rather than failing.
    pub fn resolve_active_layer(&self, map_id: &str, player_pos: &Position3D) -> Result<i32> {
        let config = self.store.map(map_id)?;

        // A missing or uncalibrated base layer means region-gated floors
        // cannot activate; resolution still runs and falls back.
        let base_map_pos = match config.base_layer() {
            Some(base) if base.is_calibrated() => {
                match self.transform(map_id, base.layer_id, player_pos) {
                    Ok(pos) => Some(pos),
                    Err(e) => {
                        warn!(map_id, error = %e, "base transform failed, resolving on height alone");
                        None
                    }
                }
            }
            _ => None,
        };

        resolve_active_layer(config, player_pos, base_map_pos)
            .ok_or_else(|| MapError::Other(format!("map '{}' has no layers", map_id)))
    }

    /// Process one position event into a display fix.
    pub fn handle_position_event(&mut self, event: &PositionEvent) -> Result<PositionFix> {
        if self.current_map.as_deref() != Some(event.map_id.as_str()) {
            info!(map_id = %event.map_id, "position event for a new map, switching");
            self.current_map = Some(event.map_id.clone());
        }

        let layer_id = self.resolve_active_layer(&event.map_id, &event.position)?;

        let config = self.store.map(&event.map_id)?;
        let layer = config
            .layer_by_id(layer_id)
            .ok_or(MapError::LayerNotFound(layer_id))?;
        let rotation_offset = layer.rotation_offset;

        let map_pos = if layer.is_calibrated() {
            match self.transform(&event.map_id, layer_id, &event.position) {
                Ok(pos) => Some(pos),
                Err(e) => {
                    warn!(map_id = %event.map_id, layer_id, error = %e, "layer transform failed");
                    None
                }
            }
        } else {
            None
        };

        Ok(PositionFix {
            layer_id,
            map_pos,
            heading_degrees: event.yaw_degrees + rotation_offset,
        })
    }

    /// A raid start switches the session to the raid's map and drops every
    /// cached transform, since a fresh raid often follows recalibration.
    pub fn handle_raid_start(&mut self, event: &RaidStartEvent) {
        info!(map_id = %event.map_id, "raid started");
        self.current_map = Some(event.map_id.clone());
        self.cache.clear();
    }

    pub fn current_map(&self) -> Option<&str> {
        self.current_map.as_deref()
    }

    // Calibration mutations invalidate the affected (map, layer) scope so a
    // stale transform can never be served after the edit.

    pub fn add_calibration_point(
        &mut self,
        map_id: &str,
        layer_id: i32,
        game_pos: Position3D,
        map_x: f64,
        map_y: f64,
    ) -> Result<()> {
        self.store
            .add_calibration_point(map_id, layer_id, game_pos, map_x, map_y)?;
        self.cache.invalidate(map_id, layer_id);
        Ok(())
    }

    pub fn remove_calibration_point(
        &mut self,
        map_id: &str,
        layer_id: i32,
        index: usize,
    ) -> Result<()> {
        self.store.remove_calibration_point(map_id, layer_id, index)?;
        self.cache.invalidate(map_id, layer_id);
        Ok(())
    }

    pub fn clear_calibration_points(&mut self, map_id: &str, layer_id: i32) -> Result<()> {
        self.store.clear_calibration_points(map_id, layer_id)?;
        self.cache.invalidate(map_id, layer_id);
        Ok(())
    }

    // Region mutations never touch the cache: regions gate layer
    // resolution, not coordinate transforms.

    pub fn set_layer_region(&mut self, map_id: &str, layer_id: i32, region: Region) -> Result<()> {
        self.store.set_layer_region(map_id, layer_id, region)
    }

    pub fn clear_layer_region(&mut self, map_id: &str, layer_id: i32) -> Result<()> {
        self.store.clear_layer_region(map_id, layer_id)
    }

    pub fn bind_layer_region(
        &mut self,
        map_id: &str,
        layer_id: i32,
        owner_layer_id: i32,
    ) -> Result<()> {
        self.store.bind_layer_region(map_id, layer_id, owner_layer_id)
    }

    pub fn unbind_layer_region(&mut self, map_id: &str, layer_id: i32) -> Result<()> {
        self.store.unbind_layer_region(map_id, layer_id)
    }

    pub fn delete_layer(&mut self, map_id: &str, layer_id: i32) -> Result<()> {
        self.store.delete_layer(map_id, layer_id)?;
        self.cache.invalidate(map_id, layer_id);
        Ok(())
    }

    /// Swapping the base layer invalidates nothing beyond what the store
    /// clears: calibration points are per-layer and survive the swap.
    pub fn swap_base_map(&mut self, map_id: &str, new_base_layer_id: i32) -> Result<()> {
        self.store.swap_base_map(map_id, new_base_layer_id)
    }

    pub fn cache_stats(&self) -> crate::transform::CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MapLayer, RegionState};
    use chrono::Utc;

    fn layer(layer_id: i32, height_min: f64, height_max: f64, is_base_map: bool) -> MapLayer {
        MapLayer {
            layer_id,
            name: format!("L{}", layer_id),
            image_path: format!("l{}.png", layer_id),
            height_min,
            height_max,
            rotation_offset: 0.0,
            is_base_map,
            region_state: RegionState::None,
            calibration_points: Vec::new(),
        }
    }

    /// Base layer calibrated with the scale-2 translate-(300,-100) mapping.
    fn calibrated_session() -> MapSession {
        let mut store = MapStore::new();
        store.ensure_map("factory", "Factory");
        store.import_layer("factory", layer(0, -1000.0, 1000.0, true)).unwrap();
        let mut session = MapSession::with_seed(store, 42);
        session
            .add_calibration_point("factory", 0, Position3D::new(100.0, 0.0, 200.0), 500.0, 300.0)
            .unwrap();
        session
            .add_calibration_point("factory", 0, Position3D::new(150.0, 0.0, 250.0), 600.0, 400.0)
            .unwrap();
        session
            .add_calibration_point("factory", 0, Position3D::new(200.0, 0.0, 200.0), 700.0, 300.0)
            .unwrap();
        session
    }

    fn event(map_id: &str, pos: Position3D, yaw: f64) -> PositionEvent {
        PositionEvent {
            position: pos,
            yaw_degrees: yaw,
            map_id: map_id.to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_transform_matches_calibration() {
        let session = calibrated_session();
        let (x, y) = session
            .transform("factory", 0, &Position3D::new(125.0, 0.0, 225.0))
            .unwrap();
        assert!((x - 550.0).abs() < 1e-6);
        assert!((y - 350.0).abs() < 1e-6);
    }

    #[test]
    fn test_transform_served_from_cache() {
        let session = calibrated_session();
        let pos = Position3D::new(125.0, 0.0, 225.0);
        session.transform("factory", 0, &pos).unwrap();
        session.transform("factory", 0, &pos).unwrap();
        let stats = session.cache_stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 1);
    }

    #[test]
    fn test_adding_point_invalidates_cache() {
        let mut session = calibrated_session();
        let pos = Position3D::new(125.0, 0.0, 225.0);
        session.transform("factory", 0, &pos).unwrap();

        // A fourth consistent point keeps the mapping but must force a refit.
        session
            .add_calibration_point("factory", 0, Position3D::new(0.0, 0.0, 0.0), 300.0, -100.0)
            .unwrap();
        session.transform("factory", 0, &pos).unwrap();
        assert_eq!(session.cache_stats().misses, 2);
    }

    #[test]
    fn test_uncalibrated_layer_yields_fix_without_map_pos() {
        let mut session = calibrated_session();
        session
            .store
            .import_layer("factory", layer(1, 0.0, 3.0, false))
            .unwrap();
        session
            .set_layer_region(
                "factory",
                1,
                Region::new(vec![(0.0, 0.0), (2000.0, 0.0), (2000.0, 2000.0), (0.0, 2000.0)]),
            )
            .unwrap();

        // Inside layer 1's region and height range, but layer 1 itself has
        // no calibration points.
        let fix = session
            .handle_position_event(&event("factory", Position3D::new(125.0, 1.0, 225.0), 90.0))
            .unwrap();
        assert_eq!(fix.layer_id, 1);
        assert_eq!(fix.map_pos, None);
        assert!((fix.heading_degrees - 90.0).abs() < 1e-9);
    }

    #[test]
    fn test_heading_includes_rotation_offset() {
        let mut session = calibrated_session();
        {
            let config = session.store.map("factory").unwrap().clone();
            let mut base = config.layer_by_id(0).unwrap().clone();
            base.rotation_offset = 15.0;
            session.store.import_layer("factory", base).unwrap();
        }

        let fix = session
            .handle_position_event(&event("factory", Position3D::new(125.0, 500.0, 225.0), 30.0))
            .unwrap();
        assert_eq!(fix.layer_id, 0);
        assert!((fix.heading_degrees - 45.0).abs() < 1e-9);
        let (mx, my) = fix.map_pos.unwrap();
        assert!((mx - 550.0).abs() < 1e-6);
        assert!((my - 350.0).abs() < 1e-6);
    }

    #[test]
    fn test_resolution_survives_uncalibrated_base() {
        let mut store = MapStore::new();
        store.ensure_map("labs", "The Lab");
        store.import_layer("labs", layer(0, -1000.0, 1000.0, true)).unwrap();
        store.import_layer("labs", layer(1, 0.0, 3.0, false)).unwrap();
        let session = MapSession::new(store);

        // Layer 1 has no region, so height alone activates it even though
        // the base layer cannot produce a base-map position.
        let id = session
            .resolve_active_layer("labs", &Position3D::new(0.0, 1.0, 0.0))
            .unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn test_baseless_map_falls_back_to_first_layer() {
        let mut store = MapStore::new();
        store.ensure_map("m", "M");
        store.import_layer("m", layer(7, 0.0, 3.0, false)).unwrap();
        let session = MapSession::new(store);

        // No base layer anywhere: resolution warns and falls back to the
        // first layer rather than erroring out.
        let id = session
            .resolve_active_layer("m", &Position3D::new(0.0, 100.0, 0.0))
            .unwrap();
        assert_eq!(id, 7);
    }

    #[test]
    fn test_empty_map_is_not_reported_as_missing() {
        let mut store = MapStore::new();
        store.ensure_map("m", "M");
        let session = MapSession::new(store);

        let err = session.resolve_active_layer("m", &Position3D::new(0.0, 0.0, 0.0));
        assert!(matches!(err, Err(MapError::Other(_))));
    }

    #[test]
    fn test_raid_start_switches_map_and_clears_cache() {
        let mut session = calibrated_session();
        session
            .transform("factory", 0, &Position3D::new(125.0, 0.0, 225.0))
            .unwrap();

        session.handle_raid_start(&RaidStartEvent {
            map_id: "factory".to_string(),
        });
        assert_eq!(session.current_map(), Some("factory"));
        let stats = session.cache_stats();
        assert_eq!(stats.entries, 0);
    }

    #[test]
    fn test_unknown_map_is_an_error() {
        let session = calibrated_session();
        let err = session.transform("shoreline", 0, &Position3D::new(0.0, 0.0, 0.0));
        assert!(matches!(err, Err(MapError::MapNotFound(_))));
    }
}
