//! Per-dimension map cache.
//!
//! A `MapDimension` owns the regions and waypoints of one dimension. Both are
//! loaded lazily: the region index and the waypoint file are read the first
//! time they are needed, and dropped again by [`MapDimension::release`].
//!
//! Every method that touches the lazy state takes `&mut self`. The manager
//! hands out `&mut MapDimension` only while holding its lock, which is what
//! serializes loading, creation, release and flush snapshots.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use log::{debug, info, warn};

use super::coords::{DimensionId, RegionCoord, ViewerPos};
use super::error::MapError;
use super::events::MapListener;
use super::executor::{DetachedTask, TaskExecutor};
use super::index::{read_index_file, write_index_file};
use super::region::{write_data, MapRegion, RegionData};
use super::sync::{queue_sync, SyncQueue};
use super::waypoint::{read_waypoints, write_waypoints, Waypoint};
use super::{REGIONS_FILE, WAYPOINTS_FILE};

/// State of a lazily loaded field.
///
/// `Unloaded` means disk has not been consulted yet; `Loaded` may well hold
/// an empty collection.
#[derive(Clone, Debug)]
pub enum LoadState<T> {
    Unloaded,
    Loaded(T),
}

impl<T> LoadState<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, LoadState::Loaded(_))
    }

    pub fn as_loaded(&self) -> Option<&T> {
        match self {
            LoadState::Loaded(value) => Some(value),
            LoadState::Unloaded => None,
        }
    }

    fn get_or_try_load<E>(&mut self, load: impl FnOnce() -> Result<T, E>) -> Result<&mut T, E> {
        if let LoadState::Unloaded = self {
            *self = LoadState::Loaded(load()?);
        }
        match self {
            LoadState::Loaded(value) => Ok(value),
            LoadState::Unloaded => unreachable!("state is loaded above"),
        }
    }
}

type RegionMap = HashMap<RegionCoord, Arc<MapRegion>>;

/// Everything a flush writes, captured at the moment the flush was requested.
#[derive(Clone, Debug)]
pub struct FlushSnapshot {
    /// Increases with every snapshot of a dimension
    pub generation: u64,
    pub waypoints: Vec<Waypoint>,
    pub regions: Vec<RegionCoord>,
    /// Region payloads modified since the previous flush
    pub region_data: Vec<(RegionCoord, RegionData)>,
}

impl FlushSnapshot {
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty() && self.regions.is_empty()
    }

    /// Write the waypoint file, the region index and modified region data.
    pub fn write(&self, directory: &Path) -> Result<(), MapError> {
        write_waypoints(&directory.join(WAYPOINTS_FILE), &self.waypoints)?;
        write_index_file(&directory.join(REGIONS_FILE), &self.regions)?;
        for (pos, data) in &self.region_data {
            write_data(&directory.join(pos.data_file_name()), data)?;
        }
        Ok(())
    }

    /// Write only what is newer than the files `written` says are on disk.
    ///
    /// A snapshot that lost the race to a later one leaves the waypoint file
    /// and the index alone, but still writes region data the later snapshot
    /// did not contain.
    fn write_newer(&self, directory: &Path, written: &mut WriteLog) -> Result<(), MapError> {
        if self.generation > written.generation {
            write_waypoints(&directory.join(WAYPOINTS_FILE), &self.waypoints)?;
            write_index_file(&directory.join(REGIONS_FILE), &self.regions)?;
            written.generation = self.generation;
        } else {
            debug!(
                "Skipping index and waypoints of flush {}, flush {} is already on disk",
                self.generation, written.generation
            );
        }

        for (pos, data) in &self.region_data {
            if written.regions.get(pos).is_some_and(|&g| g >= self.generation) {
                continue;
            }
            write_data(&directory.join(pos.data_file_name()), data)?;
            written.regions.insert(*pos, self.generation);
        }
        Ok(())
    }
}

/// Generations of the files on disk, shared by a dimension's write jobs.
///
/// Jobs hold the lock for the whole write, so two flushes of one dimension
/// never touch its files at the same time.
#[derive(Debug, Default)]
struct WriteLog {
    /// Generation of the waypoint file and index
    generation: u64,
    /// Generation of each region's data file
    regions: HashMap<RegionCoord, u64>,
}

/// Map cache of a single dimension.
pub struct MapDimension {
    pub id: DimensionId,
    pub safe_id: String,
    pub directory: PathBuf,
    regions: LoadState<RegionMap>,
    waypoints: LoadState<Vec<Waypoint>>,
    save_data: bool,
    listener: Arc<dyn MapListener>,
    generation: u64,
    written: Arc<Mutex<WriteLog>>,
}

impl MapDimension {
    pub fn new(root: &Path, id: DimensionId, listener: Arc<dyn MapListener>) -> Self {
        let safe_id = id.safe_id();
        Self {
            directory: root.join(&safe_id),
            safe_id,
            id,
            regions: LoadState::Unloaded,
            waypoints: LoadState::Unloaded,
            save_data: false,
            listener,
            generation: 0,
            written: Arc::new(Mutex::new(WriteLog::default())),
        }
    }

    /// Whether structural changes are waiting for a flush
    pub fn needs_save(&self) -> bool {
        self.save_data
    }

    /// Whether the region index or the waypoints have been loaded
    pub fn is_populated(&self) -> bool {
        self.regions.is_loaded() || self.waypoints.is_loaded()
    }

    /// Regions currently in memory. Never touches disk.
    pub fn loaded_regions(&self) -> Vec<Arc<MapRegion>> {
        self.regions
            .as_loaded()
            .map(|map| map.values().cloned().collect())
            .unwrap_or_default()
    }

    /// The region map, reading the index on first access.
    ///
    /// Fails only if the dimension directory cannot be created. A missing or
    /// unreadable index leaves the map empty and marks the dimension dirty.
    pub fn regions(&mut self) -> Result<&mut RegionMap, MapError> {
        let (id, directory, save_data) = (&self.id, &self.directory, &mut self.save_data);
        self.regions
            .get_or_try_load(|| load_regions(id, directory, save_data))
    }

    /// The region at `pos`, created if it does not exist yet.
    pub fn region(&mut self, pos: RegionCoord) -> Result<Arc<MapRegion>, MapError> {
        let (id, directory, save_data) = (&self.id, &self.directory, &mut self.save_data);
        let map = self
            .regions
            .get_or_try_load(|| load_regions(id, directory, save_data))?;

        if let Some(region) = map.get(&pos) {
            return Ok(region.clone());
        }

        let region = Arc::new(MapRegion::new(self.id.clone(), &self.directory, pos));
        region.created();
        map.insert(pos, region.clone());
        self.save_data = true;
        debug!("Created region {} in {}", pos, self.id);
        Ok(region)
    }

    /// The region at `pos` if it exists, without creating it.
    pub fn get_existing(&mut self, pos: RegionCoord) -> Result<Option<Arc<MapRegion>>, MapError> {
        Ok(self.regions()?.get(&pos).cloned())
    }

    /// The waypoint list, reading the waypoint file on first access.
    ///
    /// A missing or malformed file gives an empty list and marks the dimension
    /// dirty; a malformed one is also logged. Listeners are notified after
    /// every (re)load; they are called with the manager lock held and must not
    /// call back into the manager.
    pub fn waypoints(&mut self) -> &mut Vec<Waypoint> {
        if !self.waypoints.is_loaded() {
            let list = load_waypoints(&self.id, &self.directory, &mut self.save_data);
            self.waypoints = LoadState::Loaded(list);
            self.listener.waypoints_refreshed(&self.id);
        }

        match &mut self.waypoints {
            LoadState::Loaded(list) => list,
            LoadState::Unloaded => unreachable!("waypoints are loaded above"),
        }
    }

    pub fn add_waypoint(&mut self, waypoint: Waypoint) {
        self.waypoints().push(waypoint);
        self.save_data = true;
    }

    /// Remove the first waypoint called `name`.
    pub fn remove_waypoint(&mut self, name: &str) -> Option<Waypoint> {
        let list = self.waypoints();
        let index = list.iter().position(|w| w.name == name)?;
        let removed = list.remove(index);
        self.save_data = true;
        Some(removed)
    }

    /// Release every region payload and forget the loaded state.
    ///
    /// Nothing on disk is touched. Calling it again is a no-op.
    pub fn release(&mut self) {
        if let LoadState::Loaded(map) = &self.regions {
            for region in map.values() {
                region.release();
            }
            debug!("Released {} regions of {}", map.len(), self.id);
        }

        self.regions = LoadState::Unloaded;
        self.waypoints = LoadState::Unloaded;
    }

    /// Capture the current waypoints, region index and modified region data.
    pub fn snapshot(&mut self) -> Result<FlushSnapshot, MapError> {
        let waypoints = self.waypoints().clone();
        let map = self.regions()?;

        let regions = map.keys().copied().collect();
        let region_data = map
            .values()
            .filter_map(|region| region.take_save_snapshot().map(|data| (region.pos, data)))
            .collect();

        self.generation += 1;
        Ok(FlushSnapshot {
            generation: self.generation,
            waypoints,
            regions,
            region_data,
        })
    }

    /// Submit a write of the current state to `executor`.
    ///
    /// Returns false when there is nothing to write; a dimension that was
    /// never loaded is not touched at all. Write failures are logged by the
    /// task and never reach the caller. Writes of one dimension run one at a
    /// time, and an older snapshot never replaces files of a newer one.
    pub fn run_map_task(&mut self, executor: &dyn TaskExecutor) -> Result<bool, MapError> {
        if !self.is_populated() {
            return Ok(false);
        }

        let snapshot = self.snapshot()?;
        if snapshot.is_empty() {
            return Ok(false);
        }

        info!(
            "Saving map dimension {} ({} regions, {} waypoints, {} region images)",
            self.safe_id,
            snapshot.regions.len(),
            snapshot.waypoints.len(),
            snapshot.region_data.len()
        );

        let directory = self.directory.clone();
        let written = self.written.clone();
        executor.execute(DetachedTask::new(self.safe_id.clone(), move || {
            let mut written = written.lock().unwrap_or_else(PoisonError::into_inner);
            snapshot.write_newer(&directory, &mut written)
        }));
        self.save_data = false;
        Ok(true)
    }

    /// Queue every region for re-synchronization, nearest to `viewer` first.
    pub fn sync(&mut self, viewer: ViewerPos, queue: &dyn SyncQueue) -> Result<usize, MapError> {
        let now = chrono::Utc::now().timestamp_millis();
        let regions: Vec<_> = self.regions()?.values().cloned().collect();
        Ok(queue_sync(regions, viewer, now, queue))
    }
}

impl std::fmt::Debug for MapDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapDimension")
            .field("id", &self.id)
            .field("directory", &self.directory)
            .field("regions_loaded", &self.regions.is_loaded())
            .field("waypoints_loaded", &self.waypoints.is_loaded())
            .field("save_data", &self.save_data)
            .finish()
    }
}

fn load_regions(
    id: &DimensionId,
    directory: &Path,
    save_data: &mut bool,
) -> Result<RegionMap, MapError> {
    fs::create_dir_all(directory)?;

    let path = directory.join(REGIONS_FILE);
    let mut regions = HashMap::new();

    match read_index_file(&path) {
        Ok(coords) => {
            for pos in coords {
                regions.insert(pos, Arc::new(MapRegion::new(id.clone(), directory, pos)));
            }
            debug!("Loaded {} regions of {}", regions.len(), id);
        }
        Err(MapError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No region index for {} yet", id);
            *save_data = true;
        }
        Err(e) => {
            warn!("Failed to read region index {}: {}", path.display(), e);
            *save_data = true;
        }
    }

    Ok(regions)
}

fn load_waypoints(id: &DimensionId, directory: &Path, save_data: &mut bool) -> Vec<Waypoint> {
    let path = directory.join(WAYPOINTS_FILE);
    if !path.exists() {
        debug!("No waypoints for {} yet", id);
        *save_data = true;
        return Vec::new();
    }

    match read_waypoints(&path) {
        Ok(list) => {
            debug!("Loaded {} waypoints of {}", list.len(), id);
            list
        }
        Err(e) => {
            warn!("Failed to read waypoints {}: {}", path.display(), e);
            *save_data = true;
            Vec::new()
        }
    }
}
