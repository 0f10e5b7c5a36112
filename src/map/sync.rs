//! Distance-ordered region synchronization.
//!
//! A sync pass hands every region of a dimension to a rate-limited consumer,
//! nearest first, so regions around the viewer refresh before distant ones.

use std::sync::mpsc::Sender;
use std::sync::Arc;

use super::coords::ViewerPos;
use super::region::MapRegion;

/// A region queued for re-synchronization.
#[derive(Clone, Debug)]
pub struct SyncTask {
    pub region: Arc<MapRegion>,
    /// Milliseconds since the Unix epoch when the sync pass started
    pub timestamp: i64,
}

/// Consumer of sync tasks.
pub trait SyncQueue {
    fn queue(&self, task: SyncTask);
}

impl SyncQueue for Sender<SyncTask> {
    fn queue(&self, task: SyncTask) {
        // a dropped receiver means nobody is syncing anymore
        let _ = self.send(task);
    }
}

/// Recompute each region's viewer distance and sort ascending.
///
/// The sort is stable, so equal distances keep their input order.
pub fn order_by_distance(
    regions: impl IntoIterator<Item = Arc<MapRegion>>,
    viewer: ViewerPos,
) -> Vec<Arc<MapRegion>> {
    let mut ordered: Vec<(f64, Arc<MapRegion>)> = regions
        .into_iter()
        .map(|region| (region.update_distance(viewer), region))
        .collect();
    ordered.sort_by(|a, b| a.0.total_cmp(&b.0));
    ordered.into_iter().map(|(_, region)| region).collect()
}

/// Queue regions in distance order, all tagged with one timestamp.
///
/// Returns the number of queued regions.
pub fn queue_sync(
    regions: impl IntoIterator<Item = Arc<MapRegion>>,
    viewer: ViewerPos,
    timestamp: i64,
    queue: &dyn SyncQueue,
) -> usize {
    let ordered = order_by_distance(regions, viewer);
    let count = ordered.len();
    for region in ordered {
        queue.queue(SyncTask { region, timestamp });
    }
    count
}
