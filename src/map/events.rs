//! Notifications raised by the map cache.

use super::coords::DimensionId;

/// Listener for map cache events (minimap icon refresh, etc.).
pub trait MapListener: Send + Sync {
    /// Waypoints of a dimension were (re)loaded from disk.
    fn waypoints_refreshed(&self, dimension: &DimensionId);
}

/// Listener that ignores every event.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopListener;

impl MapListener for NoopListener {
    fn waypoints_refreshed(&self, _dimension: &DimensionId) {}
}
