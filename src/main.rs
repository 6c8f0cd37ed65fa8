// src/main.rs
//! Map Locator - inspect, validate and query calibrated map configurations

use anyhow::Context;
use clap::{Parser, Subcommand};
use map_locator::{MapSession, MapStore, Position3D};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "map-locator", version, about = "Player locator for calibrated map images")]
struct Cli {
    /// Path to the map configuration JSON file
    #[arg(short, long, default_value = "maps.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List maps, layers, calibration counts and region state
    Inspect {
        /// Restrict output to one map
        map_id: Option<String>,
    },
    /// Check every map against the base-layer and region invariants
    Validate,
    /// Resolve the active layer and map pixel for a game position
    Locate {
        map_id: String,
        x: f64,
        y: f64,
        z: f64,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let store = MapStore::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;

    match cli.command {
        Command::Inspect { map_id } => inspect(&store, map_id.as_deref()),
        Command::Validate => validate(&store),
        Command::Locate { map_id, x, y, z } => {
            let session = MapSession::new(store);
            let pos = Position3D::new(x, y, z);
            let layer_id = session
                .resolve_active_layer(&map_id, &pos)
                .with_context(|| format!("resolving layer on '{}'", map_id))?;
            println!("active layer: {}", layer_id);
            match session.transform(&map_id, layer_id, &pos) {
                Ok((mx, my)) => println!("map position: ({:.1}, {:.1})", mx, my),
                Err(e) => println!("map position: unavailable ({})", e),
            }
            Ok(())
        }
    }
}

fn inspect(store: &MapStore, only: Option<&str>) -> anyhow::Result<()> {
    let mut maps: Vec<_> = store.maps().collect();
    maps.sort_by(|a, b| a.map_id.cmp(&b.map_id));

    for config in maps {
        if only.is_some_and(|id| id != config.map_id) {
            continue;
        }
        println!("{} ({})", config.map_id, config.display_name);
        for layer in &config.layers {
            let role = if layer.is_base_map { "base" } else { "floor" };
            println!(
                "  [{}] {} {} height {}..{} points {} region {}",
                layer.layer_id,
                role,
                layer.name,
                layer.height_min,
                layer.height_max,
                layer.calibration_points.len(),
                match &layer.region_state {
                    map_locator::RegionState::Owned(r) => format!("owned ({} pts)", r.points.len()),
                    map_locator::RegionState::References(id) => format!("references layer {}", id),
                    map_locator::RegionState::None => "none".to_string(),
                }
            );
        }
    }
    Ok(())
}

fn validate(store: &MapStore) -> anyhow::Result<()> {
    let mut failures = 0usize;
    let mut maps: Vec<_> = store.maps().collect();
    maps.sort_by(|a, b| a.map_id.cmp(&b.map_id));

    for config in maps {
        match store.validate_base_map(&config.map_id) {
            Ok(()) => println!("{}: ok", config.map_id),
            Err(e) => {
                println!("{}: {}", config.map_id, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{} map(s) failed validation", failures);
    }
    Ok(())
}
