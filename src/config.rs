//! Configuration for the map cache.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::map::MapError;

/// Configuration parameters for the map cache.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MapConfig {
    /// Root directory holding one subdirectory per dimension.
    pub directory: PathBuf,

    /// Threads in the background writer pool.
    pub writer_threads: usize,

    /// Name prefix of the writer threads.
    pub writer_thread_name: String,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("local/map_cache"),
            writer_threads: 2,
            writer_thread_name: "map-writer".to_string(),
        }
    }
}

impl MapConfig {
    /// Load a JSON config file. A missing file yields the defaults; fields
    /// missing from the file keep their default values.
    pub fn load(path: &Path) -> Result<Self, MapError> {
        match fs::read_to_string(path) {
            Ok(text) => Ok(serde_json::from_str(&text)?),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), MapError> {
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}
