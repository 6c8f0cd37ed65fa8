// src/store/schema.rs
//! Persisted JSON document for a map set, with versioned migration.
//!
//! Old documents are upgraded once at load time; the typed structures
//! below assume a fully migrated document, so no field-defaulting leaks
//! into business logic.

use crate::error::{MapError, Result};
use crate::model::{CalibrationPoint, MapConfig, MapLayer, Region, RegionState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Current document version. Version 1 is the legacy format without a
/// `schema_version` field.
pub const SCHEMA_VERSION: u64 = 2;

#[derive(Debug, Serialize, Deserialize)]
pub struct MapSetDoc {
    pub schema_version: u64,
    pub maps: BTreeMap<String, MapConfigDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MapConfigDoc {
    pub map_id: String,
    pub display_name: String,
    pub default_layer_id: i32,
    pub layers: Vec<MapLayerDoc>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MapLayerDoc {
    pub layer_id: i32,
    pub name: String,
    pub image_path: String,
    pub height_min: f64,
    pub height_max: f64,
    pub rotation_offset: f64,
    pub is_base_map: bool,
    pub region_owner_layer_id: Option<i32>,
    /// Present only on the owning layer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub region: Option<Region>,
    pub calibration_points: Vec<CalibrationPoint>,
}

impl MapLayerDoc {
    pub fn from_layer(layer: &MapLayer) -> Self {
        Self {
            layer_id: layer.layer_id,
            name: layer.name.clone(),
            image_path: layer.image_path.clone(),
            height_min: layer.height_min,
            height_max: layer.height_max,
            rotation_offset: layer.rotation_offset,
            is_base_map: layer.is_base_map,
            region_owner_layer_id: layer.region_state.referenced_owner(),
            region: layer.region_state.owned().cloned(),
            calibration_points: layer.calibration_points.clone(),
        }
    }

    pub fn into_layer(self) -> MapLayer {
        // Migration guarantees a layer never carries both an owned region
        // and an owner reference; the reference wins if a hand-edited file
        // slips one through.
        let region_state = match (self.region_owner_layer_id, self.region) {
            (Some(owner_id), _) => RegionState::References(owner_id),
            (None, Some(region)) => RegionState::Owned(region),
            (None, None) => RegionState::None,
        };

        MapLayer {
            layer_id: self.layer_id,
            name: self.name,
            image_path: self.image_path,
            height_min: self.height_min,
            height_max: self.height_max,
            rotation_offset: self.rotation_offset,
            is_base_map: self.is_base_map,
            region_state,
            calibration_points: self.calibration_points,
        }
    }
}

impl MapConfigDoc {
    pub fn from_config(config: &MapConfig) -> Self {
        Self {
            map_id: config.map_id.clone(),
            display_name: config.display_name.clone(),
            default_layer_id: config.default_layer_id,
            layers: config.layers.iter().map(MapLayerDoc::from_layer).collect(),
        }
    }

    pub fn into_config(self) -> MapConfig {
        let mut config = MapConfig {
            map_id: self.map_id,
            display_name: self.display_name,
            default_layer_id: self.default_layer_id,
            layers: Vec::new(),
        };
        for layer in self.layers {
            config.add_layer(layer.into_layer());
        }
        config
    }
}

/// Upgrade a raw document to the current schema version. Runs exactly once
/// at load time.
pub fn migrate(mut doc: Value) -> Result<Value> {
    let version = doc
        .get("schema_version")
        .and_then(Value::as_u64)
        .unwrap_or(1);

    if version > SCHEMA_VERSION {
        return Err(MapError::Other(format!(
            "map config schema version {} is newer than supported version {}",
            version, SCHEMA_VERSION
        )));
    }

    if version < 2 {
        migrate_v1_to_v2(&mut doc)?;
    }

    doc.as_object_mut()
        .ok_or_else(|| MapError::Other("map config document must be a JSON object".to_string()))?
        .insert("schema_version".to_string(), Value::from(SCHEMA_VERSION));

    Ok(doc)
}

/// v1 -> v2: fill the fields the legacy writer omitted and resolve the
/// region/reference ambiguity.
///
/// - `is_base_map` defaults to `layer_id == 0` (the legacy convention)
/// - `rotation_offset` defaults to 0.0, `default_layer_id` to 0
/// - missing `calibration_points` becomes an empty list
/// - a layer carrying both `region` and `region_owner_layer_id` keeps only
///   the reference
fn migrate_v1_to_v2(doc: &mut Value) -> Result<()> {
    let root = doc
        .as_object_mut()
        .ok_or_else(|| MapError::Other("map config document must be a JSON object".to_string()))?;

    if !root.get("maps").is_some_and(Value::is_object) {
        root.insert("maps".to_string(), Value::Object(Default::default()));
        return Ok(());
    }
    let Some(maps) = root.get_mut("maps").and_then(Value::as_object_mut) else {
        return Ok(());
    };

    for map_doc in maps.values_mut() {
        let map_obj = match map_doc.as_object_mut() {
            Some(obj) => obj,
            None => continue,
        };

        map_obj
            .entry("default_layer_id")
            .or_insert_with(|| Value::from(0));

        if !map_obj.get("layers").is_some_and(Value::is_array) {
            map_obj.insert("layers".to_string(), Value::Array(Vec::new()));
            continue;
        }
        let Some(layers) = map_obj.get_mut("layers").and_then(Value::as_array_mut) else {
            continue;
        };

        for layer in layers {
            let layer_obj = match layer.as_object_mut() {
                Some(obj) => obj,
                None => continue,
            };

            let layer_id = layer_obj.get("layer_id").and_then(Value::as_i64).unwrap_or(0);
            layer_obj
                .entry("is_base_map")
                .or_insert_with(|| Value::from(layer_id == 0));
            layer_obj
                .entry("rotation_offset")
                .or_insert_with(|| Value::from(0.0));
            layer_obj
                .entry("region_owner_layer_id")
                .or_insert(Value::Null);
            layer_obj
                .entry("calibration_points")
                .or_insert_with(|| Value::Array(Vec::new()));

            let references = layer_obj
                .get("region_owner_layer_id")
                .map(|v| !v.is_null())
                .unwrap_or(false);
            if references {
                layer_obj.remove("region");
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_legacy_document_is_upgraded() {
        let legacy = json!({
            "maps": {
                "factory": {
                    "map_id": "factory",
                    "display_name": "Factory",
                    "layers": [
                        {
                            "layer_id": 0,
                            "name": "Overview",
                            "image_path": "factory.png",
                            "height_min": -100.0,
                            "height_max": 100.0
                        },
                        {
                            "layer_id": 2,
                            "name": "2F",
                            "image_path": "factory_2f.png",
                            "height_min": 3.0,
                            "height_max": 6.0,
                            "region": {"points": [[0.0, 0.0], [10.0, 0.0], [5.0, 10.0]]},
                            "region_owner_layer_id": 1
                        }
                    ]
                }
            }
        });

        let migrated = migrate(legacy).unwrap();
        assert_eq!(migrated["schema_version"], json!(SCHEMA_VERSION));

        let doc: MapSetDoc = serde_json::from_value(migrated).unwrap();
        let config = doc.maps.get("factory").unwrap();
        assert_eq!(config.default_layer_id, 0);

        let overview = &config.layers[0];
        assert!(overview.is_base_map, "layer 0 should become the base layer");
        assert_eq!(overview.rotation_offset, 0.0);
        assert!(overview.calibration_points.is_empty());

        // Both region and reference: the reference survives.
        let upper = &config.layers[1];
        assert!(!upper.is_base_map);
        assert!(upper.region.is_none());
        assert_eq!(upper.region_owner_layer_id, Some(1));
    }

    #[test]
    fn test_current_document_passes_through() {
        let doc = json!({
            "schema_version": SCHEMA_VERSION,
            "maps": {}
        });
        let migrated = migrate(doc.clone()).unwrap();
        assert_eq!(migrated, doc);
    }

    #[test]
    fn test_future_version_is_rejected() {
        let doc = json!({"schema_version": SCHEMA_VERSION + 1, "maps": {}});
        assert!(migrate(doc).is_err());
    }

    #[test]
    fn test_region_state_round_trip() {
        let layer = MapLayer {
            layer_id: 3,
            name: "3F".to_string(),
            image_path: "3f.png".to_string(),
            height_min: 6.0,
            height_max: 9.0,
            rotation_offset: 90.0,
            is_base_map: false,
            region_state: RegionState::References(1),
            calibration_points: Vec::new(),
        };

        let doc = MapLayerDoc::from_layer(&layer);
        assert_eq!(doc.region_owner_layer_id, Some(1));
        assert!(doc.region.is_none());
        assert_eq!(doc.into_layer(), layer);

        let owned = MapLayer {
            region_state: RegionState::Owned(Region::new(vec![
                (0.0, 0.0),
                (1.0, 0.0),
                (0.0, 1.0),
            ])),
            ..layer
        };
        let doc = MapLayerDoc::from_layer(&owned);
        assert!(doc.region.is_some());
        assert_eq!(doc.region_owner_layer_id, None);
        assert_eq!(doc.into_layer(), owned);
    }
}
