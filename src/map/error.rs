//! Errors raised by the map cache.

/// Errors that can occur while loading or persisting map data.
#[derive(Debug)]
pub enum MapError {
    /// IO error (directory creation, missing file, permissions, etc.)
    Io(std::io::Error),
    /// Waypoint document could not be parsed or written
    Json(serde_json::Error),
    /// Region pixel data could not be encoded or decoded
    Image(image::ImageError),
    /// Region index is malformed or written by an unsupported version
    InvalidIndex(String),
    /// Region index would exceed the count field of the format
    TooManyRegions(usize),
}

impl std::fmt::Display for MapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MapError::Io(e) => write!(f, "IO error: {}", e),
            MapError::Json(e) => write!(f, "JSON error: {}", e),
            MapError::Image(e) => write!(f, "Image error: {}", e),
            MapError::InvalidIndex(msg) => write!(f, "Invalid region index: {}", msg),
            MapError::TooManyRegions(n) => {
                write!(f, "Too many regions for index: {} (max {})", n, i16::MAX)
            }
        }
    }
}

impl std::error::Error for MapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            MapError::Io(e) => Some(e),
            MapError::Json(e) => Some(e),
            MapError::Image(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for MapError {
    fn from(e: std::io::Error) -> Self {
        MapError::Io(e)
    }
}

impl From<serde_json::Error> for MapError {
    fn from(e: serde_json::Error) -> Self {
        MapError::Json(e)
    }
}

impl From<image::ImageError> for MapError {
    fn from(e: image::ImageError) -> Self {
        MapError::Image(e)
    }
}
