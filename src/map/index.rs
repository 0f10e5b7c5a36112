//! Region index codec.
//!
//! The index lists every region coordinate known for a dimension. On disk it
//! is a zlib (deflate) stream wrapping the following big-endian layout:
//!
//!   00 : u8   format tag (reserved, 0)
//!   01 : u8   version = 1
//!   02 : i16  count (0..=32767)
//!   04 : count * [i8 x, i8 z]

use std::fs;
use std::io::{self, Read, Write};
use std::path::Path;

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use super::coords::RegionCoord;
use super::error::MapError;
use super::files::replace_file;

pub const INDEX_FORMAT_TAG: u8 = 0;
pub const INDEX_VERSION: u8 = 1;

/// Largest number of entries the count field can hold.
pub const MAX_INDEX_ENTRIES: usize = i16::MAX as usize;

/// Encode coordinates into the uncompressed index layout.
///
/// Entries are sorted and deduplicated first, so the output does not depend
/// on the iteration order of the caller's map.
pub fn encode_index(coords: &[RegionCoord]) -> Result<Vec<u8>, MapError> {
    let mut sorted = coords.to_vec();
    sorted.sort_unstable();
    sorted.dedup();

    if sorted.len() > MAX_INDEX_ENTRIES {
        return Err(MapError::TooManyRegions(sorted.len()));
    }

    let mut out = Vec::with_capacity(4 + sorted.len() * 2);
    write_index(&sorted, &mut out)?;
    Ok(out)
}

fn write_index<W: Write>(coords: &[RegionCoord], writer: &mut W) -> io::Result<()> {
    writer.write_all(&[INDEX_FORMAT_TAG, INDEX_VERSION])?;
    writer.write_all(&(coords.len() as i16).to_be_bytes())?;
    for pos in coords {
        writer.write_all(&[pos.x as u8, pos.z as u8])?;
    }
    Ok(())
}

/// Decode the uncompressed index layout.
pub fn decode_index(bytes: &[u8]) -> Result<Vec<RegionCoord>, MapError> {
    let mut reader = bytes;
    read_index(&mut reader)
}

fn read_index<R: Read>(reader: &mut R) -> Result<Vec<RegionCoord>, MapError> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;

    // header[0] is the reserved format tag and is not interpreted
    let version = header[1];
    if version == 0 || version > INDEX_VERSION {
        return Err(MapError::InvalidIndex(format!(
            "version {} is not supported (expected 1..={})",
            version, INDEX_VERSION
        )));
    }

    let count = i16::from_be_bytes([header[2], header[3]]);
    if count < 0 {
        return Err(MapError::InvalidIndex(format!("negative entry count {}", count)));
    }

    let mut entries = vec![0u8; count as usize * 2];
    reader.read_exact(&mut entries)?;

    Ok(entries
        .chunks_exact(2)
        .map(|pair| RegionCoord::new(pair[0] as i8, pair[1] as i8))
        .collect())
}

/// Encode, compress and write the index, atomically replacing any previous
/// file.
pub fn write_index_file(path: &Path, coords: &[RegionCoord]) -> Result<(), MapError> {
    let raw = encode_index(coords)?;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    let compressed = encoder.finish()?;

    replace_file(path, |file| Ok(file.write_all(&compressed)?))
}

/// Read and decode a compressed index file.
pub fn read_index_file(path: &Path) -> Result<Vec<RegionCoord>, MapError> {
    let bytes = fs::read(path)?;
    let mut decoder = ZlibDecoder::new(&bytes[..]);
    read_index(&mut decoder)
}
