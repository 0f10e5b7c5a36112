use std::error::Error;
use std::path::PathBuf;
use std::sync::{mpsc, Arc};

use clap::{Parser, Subcommand};
use log::warn;

use map_cache::config::MapConfig;
use map_cache::map::waypoint::{decode_color, format_color};
use map_cache::map::{
    DimensionId, MapManager, NoopListener, RayonExecutor, RegionCoord, ViewerPos, Waypoint,
    WaypointType, DEFAULT_WAYPOINT_COLOR,
};

#[derive(Parser, Debug)]
#[command(name = "map_cache")]
#[command(about = "Inspect and edit a per-dimension map region cache")]
struct Args {
    /// JSON config file (defaults are used if it does not exist)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Cache root directory, overrides the config
    #[arg(short, long)]
    root: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the regions and waypoints of a dimension
    Inspect {
        /// Dimension id, e.g. minecraft:overworld
        dimension: String,
    },

    /// Create a region entry and save the index
    Touch {
        dimension: String,
        #[arg(allow_negative_numbers = true)]
        x: i8,
        #[arg(allow_negative_numbers = true)]
        z: i8,
    },

    /// Add a waypoint and save
    AddWaypoint {
        dimension: String,
        name: String,
        #[arg(allow_negative_numbers = true)]
        x: i32,
        #[arg(allow_negative_numbers = true)]
        y: i32,
        #[arg(allow_negative_numbers = true)]
        z: i32,

        /// Color as #RRGGBB
        #[arg(long, default_value = "#FFFFFF")]
        color: String,

        /// Waypoint type id (default, death, home)
        #[arg(long = "type", default_value = "default")]
        waypoint_type: String,

        #[arg(long)]
        hidden: bool,
    },

    /// Remove a waypoint by name and save
    RemoveWaypoint { dimension: String, name: String },

    /// Print the region sync order for a viewer block position
    Sync {
        dimension: String,
        #[arg(allow_negative_numbers = true)]
        x: f64,
        #[arg(allow_negative_numbers = true)]
        z: f64,
    },
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => MapConfig::load(path)?,
        None => MapConfig::default(),
    };
    if let Some(root) = args.root {
        config.directory = root;
    }

    let executor = Arc::new(RayonExecutor::new(
        config.writer_threads,
        &config.writer_thread_name,
    )?);
    let manager = MapManager::from_config(&config, executor.clone(), Arc::new(NoopListener));

    match args.command {
        Command::Inspect { dimension } => {
            inspect(&manager, &DimensionId::new(dimension))?;
        }
        Command::Touch { dimension, x, z } => {
            let id = DimensionId::new(dimension);
            let region = manager.region(&id, RegionCoord::new(x, z))?;
            println!(
                "Region {} of {} ({})",
                region.pos,
                id,
                if region.is_created() { "created" } else { "existing" }
            );
            manager.flush(&id)?;
        }
        Command::AddWaypoint {
            dimension,
            name,
            x,
            y,
            z,
            color,
            waypoint_type,
            hidden,
        } => {
            let id = DimensionId::new(dimension);
            let color = decode_color(&color).unwrap_or_else(|| {
                warn!("Invalid color '{}', using {}", color, format_color(DEFAULT_WAYPOINT_COLOR));
                DEFAULT_WAYPOINT_COLOR
            });
            let waypoint_type = WaypointType::from_id(&waypoint_type).unwrap_or_else(|| {
                warn!("Unknown waypoint type '{}', using default", waypoint_type);
                WaypointType::Default
            });

            let waypoint = Waypoint::new(name, x, y, z)
                .with_color(color)
                .with_type(waypoint_type)
                .hidden(hidden);
            println!("Adding waypoint '{}' to {}", waypoint.name, id);
            manager.add_waypoint(&id, waypoint);
            manager.flush(&id)?;
        }
        Command::RemoveWaypoint { dimension, name } => {
            let id = DimensionId::new(dimension);
            match manager.remove_waypoint(&id, &name) {
                Some(_) => {
                    println!("Removed waypoint '{}' from {}", name, id);
                    manager.flush(&id)?;
                }
                None => println!("No waypoint named '{}' in {}", name, id),
            }
        }
        Command::Sync { dimension, x, z } => {
            let id = DimensionId::new(dimension);
            let (tx, rx) = mpsc::channel();
            let count = manager.sync(&id, ViewerPos::new(x, z), &tx)?;
            println!("Sync order for {} ({} regions):", id, count);
            for task in rx.try_iter() {
                println!(
                    "  {:>8}  {:>10.1} blocks",
                    task.region.pos.to_string(),
                    task.region.dist_to_viewer()
                );
            }
        }
    }

    executor.wait_idle();
    Ok(())
}

fn inspect(manager: &MapManager, id: &DimensionId) -> Result<(), Box<dyn Error>> {
    let mut regions = manager.with_dimension(id, |dim| {
        dim.regions()
            .map(|map| map.keys().copied().collect::<Vec<_>>())
    })?;
    regions.sort();

    println!("Dimension {} in {}", id, manager.directory().join(id.safe_id()).display());
    println!("Regions: {}", regions.len());
    for pos in &regions {
        println!("  {}", pos);
    }

    let waypoints = manager.waypoints(id);
    println!("Waypoints: {}", waypoints.len());
    for w in &waypoints {
        println!(
            "  {:<20} {:>7} {:>4} {:>7}  {}  {}{}",
            w.name,
            w.x,
            w.y,
            w.z,
            format_color(w.color),
            w.waypoint_type.id(),
            if w.hidden { " (hidden)" } else { "" }
        );
    }

    let known = manager.known_dimensions()?;
    if !known.is_empty() {
        println!("Dimensions on disk: {}", known.join(", "));
    }

    Ok(())
}
