// src/resolver.rs
//! Deterministic selection of the active map layer

use crate::model::{MapConfig, MapLayer, Position3D};
use tracing::warn;

/// Pick the layer to display for a player position.
///
/// `base_map_pos` is the player's position projected onto the base layer's
/// pixel plane, when the base layer's transform could be computed; region
/// tests are only possible against it.
///
/// Floor layers are considered in a fixed total order (highest
/// `height_max` first, ties by ascending `layer_id`); the first activated
/// one wins. A floor activates when the player's height is inside its
/// range and, if it has an effective region, `base_map_pos` lies inside
/// that region. A floor without a region activates on height alone; a
/// floor with a region but no usable `base_map_pos` never activates.
///
/// Falls back to the base layer, then to the first layer of the map (a
/// configuration the base-layer invariant should rule out), and returns
/// `None` only for a map with no layers at all.
pub fn resolve_active_layer(
    config: &MapConfig,
    player_pos: &Position3D,
    base_map_pos: Option<(f64, f64)>,
) -> Option<i32> {
    let mut floors: Vec<&MapLayer> = config.floor_layers().collect();
    floors.sort_by(|a, b| {
        b.height_max
            .partial_cmp(&a.height_max)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(a.layer_id.cmp(&b.layer_id))
    });

    for floor in floors {
        if is_activated(floor, config, player_pos, base_map_pos) {
            return Some(floor.layer_id);
        }
    }

    if let Some(base) = config.base_layer() {
        return Some(base.layer_id);
    }

    match config.layers.first() {
        Some(first) => {
            warn!(
                map_id = %config.map_id,
                layer_id = first.layer_id,
                "map has no base layer, falling back to its first layer"
            );
            Some(first.layer_id)
        }
        None => None,
    }
}

fn is_activated(
    layer: &MapLayer,
    config: &MapConfig,
    player_pos: &Position3D,
    base_map_pos: Option<(f64, f64)>,
) -> bool {
    if !layer.contains_height(player_pos.y) {
        return false;
    }

    match layer.effective_region(config) {
        // Region-gated: needs the player projected onto the base plane.
        Some(region) => match base_map_pos {
            Some((map_x, map_y)) => region.contains_point(map_x, map_y),
            None => false,
        },
        // No region authored: height alone decides.
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{MapLayer, Region, RegionState};

    fn layer(layer_id: i32, height_min: f64, height_max: f64, is_base: bool) -> MapLayer {
        MapLayer {
            layer_id,
            name: format!("L{}", layer_id),
            image_path: String::new(),
            height_min,
            height_max,
            rotation_offset: 0.0,
            is_base_map: is_base,
            region_state: RegionState::None,
            calibration_points: Vec::new(),
        }
    }

    fn square(x0: f64, y0: f64, side: f64) -> Region {
        Region::new(vec![
            (x0, y0),
            (x0 + side, y0),
            (x0 + side, y0 + side),
            (x0, y0 + side),
        ])
    }

    /// Base layer plus floor A (heights 0-3, region at 0,0) and floor B
    /// (heights 3-6, disjoint region at 100,100).
    fn two_floor_config() -> MapConfig {
        let mut config = MapConfig::new("factory", "Factory");
        config.add_layer(layer(0, -100.0, 100.0, true));

        let mut a = layer(1, 0.0, 3.0, false);
        a.region_state = RegionState::Owned(square(0.0, 0.0, 50.0));
        config.add_layer(a);

        let mut b = layer(2, 3.0, 6.0, false);
        b.region_state = RegionState::Owned(square(100.0, 100.0, 50.0));
        config.add_layer(b);

        config
    }

    #[test]
    fn test_floor_selected_by_height_and_region() {
        let config = two_floor_config();

        let inside_a = Some((25.0, 25.0));
        let inside_b = Some((125.0, 125.0));

        let pos = Position3D::new(0.0, 1.0, 0.0);
        assert_eq!(resolve_active_layer(&config, &pos, inside_a), Some(1));

        let pos = Position3D::new(0.0, 4.0, 0.0);
        assert_eq!(resolve_active_layer(&config, &pos, inside_b), Some(2));
    }

    #[test]
    fn test_outside_all_floor_heights_falls_back_to_base() {
        let config = two_floor_config();
        let pos = Position3D::new(0.0, 10.0, 0.0);
        assert_eq!(resolve_active_layer(&config, &pos, Some((25.0, 25.0))), Some(0));
    }

    #[test]
    fn test_height_matches_but_region_does_not() {
        let config = two_floor_config();
        // Player at floor A's height but over floor B's region.
        let pos = Position3D::new(0.0, 1.0, 0.0);
        assert_eq!(resolve_active_layer(&config, &pos, Some((125.0, 125.0))), Some(0));
    }

    #[test]
    fn test_region_gated_floor_needs_base_map_pos() {
        let config = two_floor_config();
        let pos = Position3D::new(0.0, 1.0, 0.0);
        // Uncalibrated base map: region-gated floors can never activate.
        assert_eq!(resolve_active_layer(&config, &pos, None), Some(0));
    }

    #[test]
    fn test_regionless_floor_activates_by_height_alone() {
        let mut config = MapConfig::new("m", "M");
        config.add_layer(layer(0, -100.0, 100.0, true));
        config.add_layer(layer(1, 0.0, 3.0, false));

        let pos = Position3D::new(0.0, 1.0, 0.0);
        assert_eq!(resolve_active_layer(&config, &pos, None), Some(1));
    }

    #[test]
    fn test_highest_floor_wins_then_lowest_layer_id() {
        let mut config = MapConfig::new("m", "M");
        config.add_layer(layer(0, -100.0, 100.0, true));
        // Overlapping height ranges, no regions.
        config.add_layer(layer(3, 0.0, 4.0, false));
        config.add_layer(layer(1, 0.0, 6.0, false));

        let pos = Position3D::new(0.0, 2.0, 0.0);
        // height_max 6 beats height_max 4.
        assert_eq!(resolve_active_layer(&config, &pos, None), Some(1));

        // Equal height_max: lower layer id wins.
        let mut config = MapConfig::new("m", "M");
        config.add_layer(layer(0, -100.0, 100.0, true));
        config.add_layer(layer(5, 0.0, 4.0, false));
        config.add_layer(layer(2, 0.0, 4.0, false));
        assert_eq!(resolve_active_layer(&config, &pos, None), Some(2));
    }

    #[test]
    fn test_referenced_region_gates_like_owned() {
        let mut config = MapConfig::new("m", "M");
        config.add_layer(layer(0, -100.0, 100.0, true));

        let mut owner = layer(1, 0.0, 3.0, false);
        owner.region_state = RegionState::Owned(square(0.0, 0.0, 50.0));
        config.add_layer(owner);

        let mut upper = layer(2, 3.0, 6.0, false);
        upper.region_state = RegionState::References(1);
        config.add_layer(upper);

        let pos = Position3D::new(0.0, 4.0, 0.0);
        assert_eq!(resolve_active_layer(&config, &pos, Some((25.0, 25.0))), Some(2));
        assert_eq!(resolve_active_layer(&config, &pos, Some((500.0, 500.0))), Some(0));
    }

    #[test]
    fn test_no_base_layer_backstop() {
        let mut config = MapConfig::new("m", "M");
        config.add_layer(layer(7, 0.0, 3.0, false));
        config.add_layer(layer(9, 5.0, 8.0, false));

        // Nothing activates; first layer in the collection is returned.
        let pos = Position3D::new(0.0, 100.0, 0.0);
        assert_eq!(resolve_active_layer(&config, &pos, None), Some(7));
    }

    #[test]
    fn test_empty_map() {
        let config = MapConfig::new("m", "M");
        let pos = Position3D::new(0.0, 0.0, 0.0);
        assert_eq!(resolve_active_layer(&config, &pos, None), None);
    }
}
