//! Owner of every dimension cache.
//!
//! The manager's mutex is the single coarse lock of the map cache: it guards
//! the dimension table and, through it, the lazy state of every dimension.
//! Region payloads are loaded outside of it.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use log::{info, warn};

use super::coords::{DimensionId, RegionCoord, ViewerPos};
use super::dimension::MapDimension;
use super::error::MapError;
use super::events::MapListener;
use super::executor::TaskExecutor;
use super::region::{MapRegion, RegionData};
use super::sync::SyncQueue;
use super::waypoint::Waypoint;
use crate::config::MapConfig;

/// Map cache for all dimensions below one root directory.
pub struct MapManager {
    directory: PathBuf,
    dimensions: Mutex<HashMap<DimensionId, MapDimension>>,
    executor: Arc<dyn TaskExecutor>,
    listener: Arc<dyn MapListener>,
}

impl MapManager {
    pub fn new(
        directory: impl Into<PathBuf>,
        executor: Arc<dyn TaskExecutor>,
        listener: Arc<dyn MapListener>,
    ) -> Self {
        Self {
            directory: directory.into(),
            dimensions: Mutex::new(HashMap::new()),
            executor,
            listener,
        }
    }

    pub fn from_config(
        config: &MapConfig,
        executor: Arc<dyn TaskExecutor>,
        listener: Arc<dyn MapListener>,
    ) -> Self {
        Self::new(&config.directory, executor, listener)
    }

    /// Root directory of the cache
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<DimensionId, MapDimension>> {
        self.dimensions.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` on a dimension while holding the manager lock.
    ///
    /// The dimension entry is created on first mention; nothing is read from
    /// disk until `f` asks for it.
    pub fn with_dimension<R>(&self, id: &DimensionId, f: impl FnOnce(&mut MapDimension) -> R) -> R {
        let mut dimensions = self.lock();
        let dimension = dimensions.entry(id.clone()).or_insert_with(|| {
            MapDimension::new(&self.directory, id.clone(), self.listener.clone())
        });
        f(dimension)
    }

    /// The region at `pos`, created if needed.
    pub fn region(&self, id: &DimensionId, pos: RegionCoord) -> Result<Arc<MapRegion>, MapError> {
        self.with_dimension(id, |dim| dim.region(pos))
    }

    /// Colors of an existing region, None if the dimension has no such region.
    ///
    /// The lookup happens under the lock; reading the pixel data does not.
    pub fn region_colors(
        &self,
        id: &DimensionId,
        pos: RegionCoord,
    ) -> Result<Option<RegionData>, MapError> {
        let region = self.with_dimension(id, |dim| dim.get_existing(pos))?;
        Ok(region.map(|r| r.data_blocking()))
    }

    /// Copy of a dimension's waypoints
    pub fn waypoints(&self, id: &DimensionId) -> Vec<Waypoint> {
        self.with_dimension(id, |dim| dim.waypoints().clone())
    }

    pub fn add_waypoint(&self, id: &DimensionId, waypoint: Waypoint) {
        self.with_dimension(id, |dim| dim.add_waypoint(waypoint))
    }

    pub fn remove_waypoint(&self, id: &DimensionId, name: &str) -> Option<Waypoint> {
        self.with_dimension(id, |dim| dim.remove_waypoint(name))
    }

    /// Schedule a background write of one dimension.
    ///
    /// Returns false if the dimension had nothing to write.
    pub fn flush(&self, id: &DimensionId) -> Result<bool, MapError> {
        let executor = self.executor.clone();
        self.with_dimension(id, |dim| dim.run_map_task(executor.as_ref()))
    }

    /// Schedule writes for every dimension that has loaded state.
    ///
    /// Returns the number of submitted writes.
    pub fn flush_all(&self) -> usize {
        let mut dimensions = self.lock();
        let mut submitted = 0;

        for dim in dimensions.values_mut().filter(|d| d.is_populated()) {
            match dim.run_map_task(self.executor.as_ref()) {
                Ok(true) => submitted += 1,
                Ok(false) => {}
                Err(e) => {
                    warn!("Failed to prepare map dimension {} for saving: {}", dim.safe_id, e)
                }
            }
        }

        submitted
    }

    /// Queue a dimension's regions for re-sync, nearest to `viewer` first.
    pub fn sync(
        &self,
        id: &DimensionId,
        viewer: ViewerPos,
        queue: &dyn SyncQueue,
    ) -> Result<usize, MapError> {
        self.with_dimension(id, |dim| dim.sync(viewer, queue))
    }

    /// Drop the loaded state of one dimension.
    pub fn release(&self, id: &DimensionId) {
        if let Some(dim) = self.lock().get_mut(id) {
            dim.release();
        }
    }

    /// Drop the loaded state of every dimension.
    pub fn release_all(&self) {
        let mut dimensions = self.lock();
        for dim in dimensions.values_mut() {
            dim.release();
        }
        info!("Released {} map dimensions", dimensions.len());
    }

    /// Dimensions mentioned so far in this session, sorted
    pub fn dimension_ids(&self) -> Vec<DimensionId> {
        let mut ids: Vec<_> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Safe ids of the dimension directories found on disk, sorted.
    pub fn known_dimensions(&self) -> Result<Vec<String>, MapError> {
        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        for entry in entries {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                if let Some(name) = entry.file_name().to_str() {
                    names.push(name.to_string());
                }
            }
        }
        names.sort();
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::events::NoopListener;
    use crate::map::executor::{InlineExecutor, RayonExecutor};
    use crate::map::{REGIONS_FILE, WAYPOINTS_FILE};
    use std::sync::mpsc;
    use std::thread;
    use tempfile::tempdir;

    fn manager(root: &Path) -> MapManager {
        MapManager::new(root, Arc::new(InlineExecutor), Arc::new(NoopListener))
    }

    fn overworld() -> DimensionId {
        DimensionId::new("minecraft:overworld")
    }

    #[test]
    fn test_region_identity_across_threads() {
        let root = tempdir().unwrap();
        let manager = Arc::new(manager(root.path()));
        let pos = RegionCoord::new(3, -1);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                thread::spawn(move || manager.region(&overworld(), pos).unwrap())
            })
            .collect();
        let regions: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(regions.iter().all(|r| Arc::ptr_eq(r, &regions[0])));
        let count = manager.with_dimension(&overworld(), |d| d.regions().unwrap().len());
        assert_eq!(count, 1);
    }

    #[test]
    fn test_dimensions_are_independent() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let nether = DimensionId::new("minecraft:the_nether");
        let pos = RegionCoord::new(0, 0);

        let a = manager.region(&overworld(), pos).unwrap();
        let b = manager.region(&nether, pos).unwrap();
        assert!(!Arc::ptr_eq(&a, &b));
        assert_eq!(manager.dimension_ids(), vec![overworld(), nether]);
    }

    #[test]
    fn test_region_colors_does_not_create() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let pos = RegionCoord::new(1, 2);

        assert!(manager.region_colors(&overworld(), pos).unwrap().is_none());

        let region = manager.region(&overworld(), pos).unwrap();
        region.with_data_mut(|d| d.set(1, 1, 0xFFABCDEF));
        let colors = manager.region_colors(&overworld(), pos).unwrap().unwrap();
        assert_eq!(colors.get(1, 1), 0xFFABCDEF);
    }

    #[test]
    fn test_waypoint_roundtrip_through_manager() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let wp = Waypoint::new("Base", 10, 64, -20).with_color(0x00FF00);

        manager.add_waypoint(&overworld(), wp.clone());
        assert!(manager.flush(&overworld()).unwrap());

        manager.release(&overworld());
        assert_eq!(manager.waypoints(&overworld()), vec![wp.clone()]);
        assert_eq!(manager.remove_waypoint(&overworld(), "Base"), Some(wp));
        assert!(manager.waypoints(&overworld()).is_empty());
    }

    #[test]
    fn test_flush_all_skips_untouched() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let end = DimensionId::new("minecraft:the_end");

        manager.region(&overworld(), RegionCoord::new(0, 0)).unwrap();
        manager.with_dimension(&end, |_| {});

        assert_eq!(manager.flush_all(), 1);
        assert!(root.path().join("minecraft_overworld").join(REGIONS_FILE).exists());
        assert!(!root.path().join("minecraft_the_end").exists());
    }

    #[test]
    fn test_background_flush() {
        let root = tempdir().unwrap();
        let executor = Arc::new(RayonExecutor::new(2, "test-writer").unwrap());
        let manager = MapManager::new(root.path(), executor.clone(), Arc::new(NoopListener));

        manager.region(&overworld(), RegionCoord::new(2, -3)).unwrap();
        manager.add_waypoint(&overworld(), Waypoint::new("Home", 0, 70, 0));
        assert!(manager.flush(&overworld()).unwrap());
        executor.wait_idle();

        let dir = root.path().join("minecraft_overworld");
        assert!(dir.join(REGIONS_FILE).exists());
        assert!(dir.join(WAYPOINTS_FILE).exists());
    }

    #[test]
    fn test_flush_does_not_wait_for_busy_region() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        let nether = DimensionId::new("minecraft:the_nether");
        let region = manager.region(&overworld(), RegionCoord::new(0, 0)).unwrap();
        let (entered_tx, entered_rx) = mpsc::channel();
        let (done_tx, done_rx) = mpsc::channel::<()>();

        let editing = region.clone();
        let editor = thread::spawn(move || {
            editing.with_data_mut(|d| {
                entered_tx.send(()).unwrap();
                done_rx.recv().unwrap();
                d.set(2, 2, 0xFF445566);
            })
        });
        entered_rx.recv().unwrap();

        // neither call waits for the editor to let go of the payload
        assert!(manager.flush(&overworld()).unwrap());
        manager.region(&nether, RegionCoord::new(1, 1)).unwrap();
        assert!(!region.file().exists());

        done_tx.send(()).unwrap();
        editor.join().unwrap();

        assert!(manager.flush(&overworld()).unwrap());
        assert!(region.file().exists());
    }

    #[test]
    fn test_release_all_and_reload() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        manager.region(&overworld(), RegionCoord::new(4, 4)).unwrap();
        manager.flush_all();

        manager.release_all();
        let loaded = manager.with_dimension(&overworld(), |d| {
            assert!(!d.is_populated());
            d.regions().unwrap().contains_key(&RegionCoord::new(4, 4))
        });
        assert!(loaded);
    }

    #[test]
    fn test_sync_through_manager() {
        let root = tempdir().unwrap();
        let manager = manager(root.path());
        for x in [5, 1, 3] {
            manager.region(&overworld(), RegionCoord::new(0, x)).unwrap();
        }

        let (tx, rx) = mpsc::channel();
        manager.sync(&overworld(), ViewerPos::new(256.0, 256.0), &tx).unwrap();
        let zs: Vec<i8> = rx.try_iter().map(|t| t.region.pos.z).collect();
        assert_eq!(zs, vec![1, 3, 5]);
    }

    #[test]
    fn test_known_dimensions() {
        let root = tempdir().unwrap();
        let manager = manager(&root.path().join("cache"));
        assert!(manager.known_dimensions().unwrap().is_empty());

        manager.region(&overworld(), RegionCoord::new(0, 0)).unwrap();
        manager.region(&DimensionId::new("mod:mining"), RegionCoord::new(0, 0)).unwrap();
        assert_eq!(
            manager.known_dimensions().unwrap(),
            vec!["minecraft_overworld".to_string(), "mod_mining".to_string()]
        );
    }
}
