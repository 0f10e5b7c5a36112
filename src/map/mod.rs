//! Map cache engine.
//!
//! Keeps rendered map regions and waypoints per dimension, loads them lazily
//! from disk and writes them back on background threads.
//!
//! On-disk layout:
//!
//! ```text
//! <root>/<safe dimension id>/dimension.regions   zlib compressed region index
//! <root>/<safe dimension id>/waypoints.json      waypoint list
//! <root>/<safe dimension id>/<x>,<z>.png         region pixel data
//! ```

pub mod coords;
pub mod dimension;
pub mod error;
pub mod events;
pub mod executor;
pub mod files;
pub mod index;
pub mod manager;
pub mod region;
pub mod sync;
pub mod waypoint;

pub use coords::{DimensionId, RegionCoord, ViewerPos};
pub use dimension::{FlushSnapshot, LoadState, MapDimension};
pub use error::MapError;
pub use events::{MapListener, NoopListener};
pub use executor::{DetachedTask, InlineExecutor, RayonExecutor, TaskExecutor};
pub use manager::MapManager;
pub use region::{MapRegion, RegionData, RegionRenderer};
pub use sync::{SyncQueue, SyncTask};
pub use waypoint::{Waypoint, WaypointType, DEFAULT_WAYPOINT_COLOR};

/// Blocks (and pixels) per region side
pub const REGION_SIZE: usize = 512;

/// Region index file inside a dimension directory
pub const REGIONS_FILE: &str = "dimension.regions";

/// Waypoint file inside a dimension directory
pub const WAYPOINTS_FILE: &str = "waypoints.json";
