//! A single cached map region and its pixel payload.
//!
//! The payload of a region is loaded lazily from `<x>,<z>.png` inside the
//! dimension directory. Each region guards its payload with its own mutex, so
//! loading or rendering one region never blocks access to the dimension's
//! region map.

use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError, TryLockError};

use image::{ImageFormat, Rgba, RgbaImage};
use log::{debug, warn};

use super::coords::{DimensionId, RegionCoord, ViewerPos};
use super::error::MapError;
use super::files::replace_file;
use super::REGION_SIZE;

/// Rendered colors of one region, ARGB, row major.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RegionData {
    pixels: Vec<u32>,
}

impl RegionData {
    /// Fully transparent region
    pub fn blank() -> Self {
        Self {
            pixels: vec![0; REGION_SIZE * REGION_SIZE],
        }
    }

    /// Wrap a pixel buffer; returns None unless it holds exactly one region.
    pub fn from_pixels(pixels: Vec<u32>) -> Option<Self> {
        if pixels.len() == REGION_SIZE * REGION_SIZE {
            Some(Self { pixels })
        } else {
            None
        }
    }

    pub fn pixels(&self) -> &[u32] {
        &self.pixels
    }

    pub fn get(&self, x: usize, z: usize) -> u32 {
        self.pixels[z * REGION_SIZE + x]
    }

    pub fn set(&mut self, x: usize, z: usize, color: u32) {
        self.pixels[z * REGION_SIZE + x] = color;
    }

    fn to_image(&self) -> RgbaImage {
        RgbaImage::from_fn(REGION_SIZE as u32, REGION_SIZE as u32, |x, z| {
            let [a, r, g, b] = self.get(x as usize, z as usize).to_be_bytes();
            Rgba([r, g, b, a])
        })
    }

    fn from_image(img: &RgbaImage) -> Result<Self, MapError> {
        if img.width() as usize != REGION_SIZE || img.height() as usize != REGION_SIZE {
            return Err(MapError::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                format!(
                    "region image is {}x{}, expected {}x{}",
                    img.width(),
                    img.height(),
                    REGION_SIZE,
                    REGION_SIZE
                ),
            )));
        }

        let pixels = img
            .pixels()
            .map(|Rgba([r, g, b, a])| u32::from_be_bytes([*a, *r, *g, *b]))
            .collect();
        Ok(Self { pixels })
    }
}

/// Producer of region colors (the world renderer).
pub trait RegionRenderer: Send + Sync {
    fn render(&self, dimension: &DimensionId, pos: RegionCoord) -> RegionData;
}

/// Write region colors as an RGBA PNG, atomically replacing any previous file.
pub fn write_data(path: &Path, data: &RegionData) -> Result<(), MapError> {
    let img = data.to_image();
    replace_file(path, |file| {
        let mut writer = BufWriter::new(file);
        img.write_to(&mut writer, ImageFormat::Png)?;
        writer.flush()?;
        Ok(())
    })
}

/// Read region colors from a PNG written by [`write_data`].
pub fn read_data(path: &Path) -> Result<RegionData, MapError> {
    let img = image::open(path)?.to_rgba8();
    RegionData::from_image(&img)
}

/// One cache entry of a dimension.
pub struct MapRegion {
    pub dimension: DimensionId,
    pub pos: RegionCoord,
    file: PathBuf,
    data: Mutex<Option<RegionData>>,
    created: AtomicBool,
    modified: AtomicBool,
    /// f64 bits of the last computed viewer distance
    distance: AtomicU64,
}

impl MapRegion {
    pub fn new(dimension: DimensionId, directory: &Path, pos: RegionCoord) -> Self {
        Self {
            file: directory.join(pos.data_file_name()),
            dimension,
            pos,
            data: Mutex::new(None),
            created: AtomicBool::new(false),
            modified: AtomicBool::new(false),
            distance: AtomicU64::new(0f64.to_bits()),
        }
    }

    /// Path of the region's pixel data file
    pub fn file(&self) -> &Path {
        &self.file
    }

    fn lock_data(&self) -> MutexGuard<'_, Option<RegionData>> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The payload guard, or None while another thread loads or edits it.
    ///
    /// Used by everything that runs under the manager lock, which must never
    /// wait on payload work.
    fn try_lock_data(&self) -> Option<MutexGuard<'_, Option<RegionData>>> {
        match self.data.try_lock() {
            Ok(slot) => Some(slot),
            Err(TryLockError::Poisoned(e)) => Some(e.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        }
    }

    fn load(&self) -> RegionData {
        if !self.file.exists() {
            return RegionData::blank();
        }

        match read_data(&self.file) {
            Ok(data) => {
                debug!("Loaded region {} of {}", self.pos, self.dimension);
                data
            }
            Err(e) => {
                warn!(
                    "Failed to read region {} of {} from {}: {}",
                    self.pos,
                    self.dimension,
                    self.file.display(),
                    e
                );
                RegionData::blank()
            }
        }
    }

    /// Run `f` on the payload, loading it from disk first if needed.
    ///
    /// Blocks while the payload is read.
    pub fn with_data<R>(&self, f: impl FnOnce(&RegionData) -> R) -> R {
        let mut slot = self.lock_data();
        let data = slot.get_or_insert_with(|| self.load());
        f(data)
    }

    /// Copy of the payload, loading it from disk first if needed.
    pub fn data_blocking(&self) -> RegionData {
        self.with_data(RegionData::clone)
    }

    /// Mutate the payload and mark the region modified.
    pub fn with_data_mut<R>(&self, f: impl FnOnce(&mut RegionData) -> R) -> R {
        let mut slot = self.lock_data();
        let data = slot.get_or_insert_with(|| self.load());
        let result = f(data);
        self.modified.store(true, Ordering::Release);
        result
    }

    /// Replace the payload with freshly rendered colors.
    pub fn render(&self, renderer: &dyn RegionRenderer) {
        let data = renderer.render(&self.dimension, self.pos);
        *self.lock_data() = Some(data);
        self.modified.store(true, Ordering::Release);
    }

    /// Whether the payload is in memory. A payload that is busy being loaded
    /// or edited counts as loaded.
    pub fn is_loaded(&self) -> bool {
        self.try_lock_data().map_or(true, |slot| slot.is_some())
    }

    pub fn is_modified(&self) -> bool {
        self.modified.load(Ordering::Acquire)
    }

    /// Flag the region as newly created in this session.
    pub fn created(&self) {
        self.created.store(true, Ordering::Release);
    }

    pub fn is_created(&self) -> bool {
        self.created.load(Ordering::Acquire)
    }

    /// Clone the payload for saving if it changed since the last snapshot.
    ///
    /// A busy payload is skipped and keeps its modified flag, so the next
    /// snapshot picks it up.
    pub fn take_save_snapshot(&self) -> Option<RegionData> {
        let Some(slot) = self.try_lock_data() else {
            debug!("Region {} of {} is busy, not saving it yet", self.pos, self.dimension);
            return None;
        };
        let data = slot.as_ref()?;
        if self.modified.swap(false, Ordering::AcqRel) {
            Some(data.clone())
        } else {
            None
        }
    }

    /// Drop the payload. Unsaved changes are discarded.
    ///
    /// A busy payload is left alone; it goes away with the last handle to the
    /// region.
    pub fn release(&self) {
        match self.try_lock_data() {
            Some(mut slot) => {
                *slot = None;
                self.modified.store(false, Ordering::Release);
            }
            None => debug!(
                "Region {} of {} is busy, not releasing its payload",
                self.pos, self.dimension
            ),
        }
    }

    /// Distance computed during the last sync pass
    pub fn dist_to_viewer(&self) -> f64 {
        f64::from_bits(self.distance.load(Ordering::Relaxed))
    }

    /// Recompute and cache the distance to the viewer.
    pub fn update_distance(&self, viewer: ViewerPos) -> f64 {
        let distance = viewer.distance_to(self.pos);
        self.distance.store(distance.to_bits(), Ordering::Relaxed);
        distance
    }
}

impl std::fmt::Debug for MapRegion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapRegion")
            .field("dimension", &self.dimension)
            .field("pos", &self.pos)
            .field("loaded", &self.is_loaded())
            .field("created", &self.is_created())
            .finish()
    }
}
