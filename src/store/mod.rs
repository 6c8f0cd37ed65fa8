// src/store/mod.rs
//! Map-set storage: the owning side of all configuration mutation

mod schema;

pub use schema::SCHEMA_VERSION;

use crate::error::{MapError, Result};
use crate::model::region::MIN_REGION_POINTS;
use crate::model::{CalibrationPoint, MapConfig, MapLayer, Position3D, Region, RegionState};
use schema::{MapConfigDoc, MapSetDoc};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// In-memory collection of map configurations with JSON persistence.
///
/// All mutation of maps, layers, calibration points and regions goes
/// through this type on the owning (editing) path; read paths get shared
/// references. Persistence is explicit: mutators change memory, callers
/// decide when to `save`.
pub struct MapStore {
    path: Option<PathBuf>,
    maps: HashMap<String, MapConfig>,
}

impl MapStore {
    /// An empty in-memory store with no backing file.
    pub fn new() -> Self {
        Self {
            path: None,
            maps: HashMap::new(),
        }
    }

    /// Load a store from a JSON document, migrating old schema versions. A
    /// missing file yields an empty store bound to that path.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            debug!(path = %path.display(), "map config file not found, starting empty");
            return Ok(Self {
                path: Some(path),
                maps: HashMap::new(),
            });
        }

        let contents = std::fs::read_to_string(&path)?;
        let raw: serde_json::Value = serde_json::from_str(&contents)?;
        let migrated = schema::migrate(raw)?;
        let doc: MapSetDoc = serde_json::from_value(migrated)?;

        let maps = doc
            .maps
            .into_iter()
            .map(|(map_id, config)| (map_id, config.into_config()))
            .collect();

        Ok(Self {
            path: Some(path),
            maps,
        })
    }

    /// Persist to the path the store was loaded from.
    pub fn save(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to(path.clone()),
            None => Err(MapError::Other(
                "store has no backing file, use save_to".to_string(),
            )),
        }
    }

    pub fn save_to(&self, path: impl AsRef<Path>) -> Result<()> {
        let doc = MapSetDoc {
            schema_version: SCHEMA_VERSION,
            maps: self
                .maps
                .iter()
                .map(|(map_id, config)| (map_id.clone(), MapConfigDoc::from_config(config)))
                .collect(),
        };

        let contents = serde_json::to_string_pretty(&doc)?;
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), contents)?;
        Ok(())
    }

    pub fn map(&self, map_id: &str) -> Result<&MapConfig> {
        self.maps
            .get(map_id)
            .ok_or_else(|| MapError::MapNotFound(map_id.to_string()))
    }

    fn map_mut(&mut self, map_id: &str) -> Result<&mut MapConfig> {
        self.maps
            .get_mut(map_id)
            .ok_or_else(|| MapError::MapNotFound(map_id.to_string()))
    }

    pub fn maps(&self) -> impl Iterator<Item = &MapConfig> {
        self.maps.values()
    }

    /// Create an empty map entry if it does not exist yet.
    pub fn ensure_map(&mut self, map_id: &str, display_name: &str) -> &mut MapConfig {
        self.maps
            .entry(map_id.to_string())
            .or_insert_with(|| MapConfig::new(map_id, display_name))
    }

    /// Create a layer, or update an existing one in place. This is the only
    /// way layers come into existence.
    pub fn import_layer(&mut self, map_id: &str, layer: MapLayer) -> Result<()> {
        if layer.is_base_map && !matches!(layer.region_state, RegionState::None) {
            return Err(MapError::InvalidRegion(
                "the base layer cannot own or reference a region".to_string(),
            ));
        }
        if layer.height_min > layer.height_max {
            return Err(MapError::Other(format!(
                "layer {}: height_min {} exceeds height_max {}",
                layer.layer_id, layer.height_min, layer.height_max
            )));
        }

        // Imported region state obeys the same invariants the region
        // mutators enforce: no overlapping owned regions, references only
        // to an existing owning layer, no self-reference.
        match &layer.region_state {
            RegionState::Owned(region) => {
                self.validate_region(map_id, region, Some(layer.layer_id))?;
            }
            RegionState::References(owner_id) => {
                if *owner_id == layer.layer_id {
                    return Err(MapError::Other(
                        "a layer cannot reference its own region".to_string(),
                    ));
                }
                let owner = self
                    .map(map_id)?
                    .layer_by_id(*owner_id)
                    .ok_or(MapError::LayerNotFound(*owner_id))?;
                if !owner.region_state.is_owner() {
                    return Err(MapError::InvalidRegion(format!(
                        "layer {} does not own a region",
                        owner_id
                    )));
                }
            }
            RegionState::None => {}
        }

        let config = self.map_mut(map_id)?;
        if layer.is_base_map {
            if let Some(base) = config.base_layer() {
                if base.layer_id != layer.layer_id {
                    return Err(MapError::BaseMapDuplicate {
                        map_id: map_id.to_string(),
                        count: config.count_base_layers() + 1,
                    });
                }
            }
        }

        match config.layer_by_id_mut(layer.layer_id) {
            Some(existing) => *existing = layer,
            None => {
                info!(map_id, layer_id = layer.layer_id, "imported new layer");
                config.add_layer(layer);
            }
        }
        Ok(())
    }

    /// Remove a layer. The base layer is protected; deleting a
    /// region-owning layer clears the region state of every layer that
    /// references it.
    pub fn delete_layer(&mut self, map_id: &str, layer_id: i32) -> Result<()> {
        let config = self.map_mut(map_id)?;
        let target = config
            .layer_by_id(layer_id)
            .ok_or(MapError::LayerNotFound(layer_id))?;

        if target.is_base_map {
            return Err(MapError::Other(
                "the base layer cannot be deleted".to_string(),
            ));
        }

        if target.region_state.is_owner() {
            for referencing_id in config.layers_referencing(layer_id) {
                if let Some(l) = config.layer_by_id_mut(referencing_id) {
                    l.region_state = RegionState::None;
                    info!(
                        map_id,
                        layer_id = referencing_id,
                        owner_id = layer_id,
                        "cleared region reference to deleted layer"
                    );
                }
            }
        }

        config.remove_layer(layer_id);
        Ok(())
    }

    /// Append a calibration point. Callers must invalidate any transform
    /// cache for this (map, layer).
    pub fn add_calibration_point(
        &mut self,
        map_id: &str,
        layer_id: i32,
        game_pos: Position3D,
        map_x: f64,
        map_y: f64,
    ) -> Result<()> {
        let layer = self.layer_mut(map_id, layer_id)?;
        layer
            .calibration_points
            .push(CalibrationPoint::new(game_pos, map_x, map_y));
        Ok(())
    }

    /// Remove one calibration point by position in the ordered collection.
    pub fn remove_calibration_point(
        &mut self,
        map_id: &str,
        layer_id: i32,
        index: usize,
    ) -> Result<CalibrationPoint> {
        let layer = self.layer_mut(map_id, layer_id)?;
        if index >= layer.calibration_points.len() {
            return Err(MapError::Other(format!(
                "calibration point index {} out of range ({} points)",
                index,
                layer.calibration_points.len()
            )));
        }
        Ok(layer.calibration_points.remove(index))
    }

    pub fn clear_calibration_points(&mut self, map_id: &str, layer_id: i32) -> Result<()> {
        let layer = self.layer_mut(map_id, layer_id)?;
        layer.calibration_points.clear();
        Ok(())
    }

    /// Check a candidate region against the region invariants: at least 3
    /// points, and no geometric overlap with any region owned by another
    /// layer on the same map.
    pub fn validate_region(
        &self,
        map_id: &str,
        candidate: &Region,
        exclude_layer_id: Option<i32>,
    ) -> Result<()> {
        if candidate.points.len() < MIN_REGION_POINTS {
            return Err(MapError::InvalidRegion(format!(
                "a region needs at least {} points, got {}",
                MIN_REGION_POINTS,
                candidate.points.len()
            )));
        }

        let config = self.map(map_id)?;
        for layer in config.floor_layers() {
            if Some(layer.layer_id) == exclude_layer_id {
                continue;
            }
            // Referencing layers share an owner's geometry; checking owners
            // covers them.
            let Some(owned) = layer.region_state.owned() else {
                continue;
            };
            if candidate.intersects_with(owned) {
                return Err(MapError::RegionOverlap {
                    layer_id: layer.layer_id,
                    message: format!("candidate region intersects region of layer '{}'", layer.name),
                });
            }
        }
        Ok(())
    }

    /// Layers with identical effective region geometry must have disjoint
    /// height ranges, otherwise resolution between them would be ambiguous.
    pub fn validate_height(
        &self,
        map_id: &str,
        layer_id: i32,
        height_min: f64,
        height_max: f64,
        region: Option<&Region>,
    ) -> Result<()> {
        let Some(region) = region else {
            return Ok(());
        };

        let config = self.map(map_id)?;
        for layer in config.floor_layers() {
            if layer.layer_id == layer_id {
                continue;
            }
            let Some(other) = layer.effective_region(config) else {
                continue;
            };
            if other.points != region.points {
                continue;
            }
            let disjoint = height_max <= layer.height_min || height_min >= layer.height_max;
            if !disjoint {
                return Err(MapError::HeightRangeConflict {
                    layer_id: layer.layer_id,
                    message: format!(
                        "height range [{}, {}] overlaps layer '{}' ({}..{}) sharing the same region",
                        height_min, height_max, layer.name, layer.height_min, layer.height_max
                    ),
                });
            }
        }
        Ok(())
    }

    /// Replace a floor layer's owned region wholesale, enforcing the
    /// overlap invariant. Region edits never require transform-cache
    /// invalidation.
    pub fn set_layer_region(&mut self, map_id: &str, layer_id: i32, region: Region) -> Result<()> {
        self.validate_region(map_id, &region, Some(layer_id))?;

        let layer = self.layer_mut(map_id, layer_id)?;
        if layer.is_base_map {
            return Err(MapError::InvalidRegion(
                "the base layer cannot own a region".to_string(),
            ));
        }
        layer.region_state = RegionState::Owned(region);
        Ok(())
    }

    /// Clear a layer's region state. References held by other layers to a
    /// cleared owner are cleared as well, so no dangling reference remains.
    pub fn clear_layer_region(&mut self, map_id: &str, layer_id: i32) -> Result<()> {
        let config = self.map_mut(map_id)?;
        let target = config
            .layer_by_id(layer_id)
            .ok_or(MapError::LayerNotFound(layer_id))?;

        if target.region_state.is_owner() {
            for referencing_id in config.layers_referencing(layer_id) {
                if let Some(l) = config.layer_by_id_mut(referencing_id) {
                    l.region_state = RegionState::None;
                }
            }
        }

        if let Some(layer) = config.layer_by_id_mut(layer_id) {
            layer.region_state = RegionState::None;
        }
        Ok(())
    }

    /// Make `layer_id` share the region owned by `owner_layer_id`.
    /// Reference chains are rejected here, which is what keeps
    /// `effective_region`'s single level of indirection sufficient.
    pub fn bind_layer_region(
        &mut self,
        map_id: &str,
        layer_id: i32,
        owner_layer_id: i32,
    ) -> Result<()> {
        if layer_id == owner_layer_id {
            return Err(MapError::Other(
                "a layer cannot reference its own region".to_string(),
            ));
        }

        let config = self.map_mut(map_id)?;
        let owner = config
            .layer_by_id(owner_layer_id)
            .ok_or(MapError::LayerNotFound(owner_layer_id))?;
        if !owner.region_state.is_owner() {
            return Err(MapError::InvalidRegion(format!(
                "layer {} does not own a region",
                owner_layer_id
            )));
        }

        let layer = config
            .layer_by_id_mut(layer_id)
            .ok_or(MapError::LayerNotFound(layer_id))?;
        if layer.is_base_map {
            return Err(MapError::InvalidRegion(
                "the base layer cannot reference a region".to_string(),
            ));
        }
        layer.region_state = RegionState::References(owner_layer_id);
        Ok(())
    }

    pub fn unbind_layer_region(&mut self, map_id: &str, layer_id: i32) -> Result<()> {
        let layer = self.layer_mut(map_id, layer_id)?;
        layer.region_state = RegionState::None;
        Ok(())
    }

    /// Demote the current base layer and promote another in its place.
    /// Every region on the map is cleared: region pixel coordinates are
    /// authored against the base image and are meaningless after a swap.
    pub fn swap_base_map(&mut self, map_id: &str, new_base_layer_id: i32) -> Result<()> {
        let config = self.map_mut(map_id)?;

        let new_base = config
            .layer_by_id(new_base_layer_id)
            .ok_or(MapError::LayerNotFound(new_base_layer_id))?;
        if new_base.is_base_map {
            return Err(MapError::Other(format!(
                "layer {} is already the base layer",
                new_base_layer_id
            )));
        }

        let old_base_id = config
            .base_layer()
            .map(|l| l.layer_id)
            .ok_or_else(|| MapError::BaseMapMissing(map_id.to_string()))?;

        for layer in &mut config.layers {
            layer.is_base_map = layer.layer_id == new_base_layer_id;
            layer.region_state = RegionState::None;
        }

        info!(map_id, old_base_id, new_base_layer_id, "swapped base layer");
        Ok(())
    }

    /// Enforce the one-base-layer invariant for a map.
    pub fn validate_base_map(&self, map_id: &str) -> Result<()> {
        let config = self.map(map_id)?;
        match config.count_base_layers() {
            0 => Err(MapError::BaseMapMissing(map_id.to_string())),
            1 => Ok(()),
            count => Err(MapError::BaseMapDuplicate {
                map_id: map_id.to_string(),
                count,
            }),
        }
    }

    fn layer_mut(&mut self, map_id: &str, layer_id: i32) -> Result<&mut MapLayer> {
        self.map_mut(map_id)?
            .layer_by_id_mut(layer_id)
            .ok_or(MapError::LayerNotFound(layer_id))
    }
}

impl Default for MapStore {
    fn default() -> Self {
        Self::new()
    }
}
