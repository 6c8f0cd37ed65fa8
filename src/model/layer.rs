// src/model/layer.rs
//! Map layers and per-map configuration

use super::calibration::CalibrationPoint;
use super::region::Region;

/// Minimum number of calibration points required to fit a transform.
pub const MIN_CALIBRATION_POINTS: usize = 3;

/// How a layer relates to an activation region.
///
/// Ownership and reference are mutually exclusive by construction; a layer
/// either authors its own polygon, borrows the polygon of exactly one
/// owning layer, or has none. Reference chains (a referencing layer
/// pointing at another referencing layer) are rejected by the mutators.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum RegionState {
    Owned(Region),
    References(i32),
    #[default]
    None,
}

impl RegionState {
    pub fn is_owner(&self) -> bool {
        matches!(self, RegionState::Owned(_))
    }

    pub fn owned(&self) -> Option<&Region> {
        match self {
            RegionState::Owned(region) => Some(region),
            _ => None,
        }
    }

    pub fn referenced_owner(&self) -> Option<i32> {
        match self {
            RegionState::References(owner_id) => Some(*owner_id),
            _ => None,
        }
    }
}

/// A single map image: either the one base (overview) layer of a map, or a
/// floor layer gated by a height range and optionally a region.
#[derive(Debug, Clone, PartialEq)]
pub struct MapLayer {
    /// Any sign is meaningful: 0 is conventionally ground, negative is
    /// underground.
    pub layer_id: i32,
    pub name: String,
    pub image_path: String,
    pub height_min: f64,
    pub height_max: f64,
    /// Display-only rotation correction in degrees. Never folded into the
    /// affine coefficients.
    pub rotation_offset: f64,
    pub is_base_map: bool,
    pub region_state: RegionState,
    pub calibration_points: Vec<CalibrationPoint>,
}

impl MapLayer {
    pub fn contains_height(&self, y: f64) -> bool {
        self.height_min <= y && y <= self.height_max
    }

    /// Whether the layer has enough calibration points for a transform.
    pub fn is_calibrated(&self) -> bool {
        self.calibration_points.len() >= MIN_CALIBRATION_POINTS
    }

    /// Resolve the layer's effective region: its own if owned, otherwise
    /// exactly one level of indirection through a referenced owner. A
    /// reference pointing at a non-owning layer resolves to nothing.
    pub fn effective_region<'a>(&'a self, config: &'a MapConfig) -> Option<&'a Region> {
        match &self.region_state {
            RegionState::Owned(region) => Some(region),
            RegionState::References(owner_id) => config
                .layer_by_id(*owner_id)
                .and_then(|owner| owner.region_state.owned()),
            RegionState::None => None,
        }
    }
}

/// All layers and calibration data for one map.
#[derive(Debug, Clone, PartialEq)]
pub struct MapConfig {
    pub map_id: String,
    pub display_name: String,
    pub default_layer_id: i32,
    pub layers: Vec<MapLayer>,
}

impl MapConfig {
    pub fn new(map_id: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            map_id: map_id.into(),
            display_name: display_name.into(),
            default_layer_id: 0,
            layers: Vec::new(),
        }
    }

    pub fn layer_by_id(&self, layer_id: i32) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.layer_id == layer_id)
    }

    pub fn layer_by_id_mut(&mut self, layer_id: i32) -> Option<&mut MapLayer> {
        self.layers.iter_mut().find(|l| l.layer_id == layer_id)
    }

    pub fn base_layer(&self) -> Option<&MapLayer> {
        self.layers.iter().find(|l| l.is_base_map)
    }

    pub fn floor_layers(&self) -> impl Iterator<Item = &MapLayer> {
        self.layers.iter().filter(|l| !l.is_base_map)
    }

    /// Layers currently referencing the given owner's region.
    pub fn layers_referencing(&self, owner_layer_id: i32) -> Vec<i32> {
        self.layers
            .iter()
            .filter(|l| l.region_state.referenced_owner() == Some(owner_layer_id))
            .map(|l| l.layer_id)
            .collect()
    }

    /// Insert a layer keeping the collection ordered by layer id.
    pub fn add_layer(&mut self, layer: MapLayer) {
        self.layers.push(layer);
        self.layers.sort_by_key(|l| l.layer_id);
    }

    pub fn remove_layer(&mut self, layer_id: i32) -> bool {
        let before = self.layers.len();
        self.layers.retain(|l| l.layer_id != layer_id);
        self.layers.len() != before
    }

    pub fn count_base_layers(&self) -> usize {
        self.layers.iter().filter(|l| l.is_base_map).count()
    }
}
