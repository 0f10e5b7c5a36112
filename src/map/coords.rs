//! Coordinate types for the map cache.
//!
//! Regions are addressed in region space: one region covers a square of
//! `REGION_SIZE` blocks, and the region index stores each axis as a signed byte.

use std::fmt;

use super::REGION_SIZE;

/// Position of a region in region space.
///
/// Ordered by `x` then `z`; the order only matters for producing stable
/// index files.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionCoord {
    pub x: i8,
    pub z: i8,
}

impl RegionCoord {
    pub const fn new(x: i8, z: i8) -> Self {
        Self { x, z }
    }

    /// Region containing the given block position.
    ///
    /// Returns None when the region lies outside the signed-byte range the
    /// index format can store.
    pub fn from_block(block_x: i32, block_z: i32) -> Option<Self> {
        let shift = REGION_SIZE.trailing_zeros();
        let x = i8::try_from(block_x >> shift).ok()?;
        let z = i8::try_from(block_z >> shift).ok()?;
        Some(Self { x, z })
    }

    /// Block-space center of this region
    pub fn center_block(&self) -> (f64, f64) {
        let size = REGION_SIZE as f64;
        (
            self.x as f64 * size + size / 2.0,
            self.z as f64 * size + size / 2.0,
        )
    }

    /// File name of the region's pixel data inside the dimension directory
    pub fn data_file_name(&self) -> String {
        format!("{},{}.png", self.x, self.z)
    }
}

impl fmt::Display for RegionCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.x, self.z)
    }
}

/// Namespaced dimension identifier, e.g. `minecraft:overworld`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DimensionId(String);

impl DimensionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe form used as the dimension's directory name.
    pub fn safe_id(&self) -> String {
        self.0.replace(':', "_")
    }
}

impl fmt::Display for DimensionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DimensionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Viewer position in block space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ViewerPos {
    pub x: f64,
    pub z: f64,
}

impl ViewerPos {
    pub fn new(x: f64, z: f64) -> Self {
        Self { x, z }
    }

    /// Euclidean distance in blocks from the viewer to a region's center
    pub fn distance_to(&self, pos: RegionCoord) -> f64 {
        let (cx, cz) = pos.center_block();
        let dx = cx - self.x;
        let dz = cz - self.z;
        (dx * dx + dz * dz).sqrt()
    }
}
