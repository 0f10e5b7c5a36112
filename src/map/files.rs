//! Whole-file replacement for the cache's data files.

use std::fs::File;
use std::path::Path;

use tempfile::NamedTempFile;

use super::error::MapError;

/// Replace `path` with the bytes produced by `write`.
///
/// The content goes to a temporary file in the same directory which is then
/// renamed over `path`, so readers see either the old or the new file. On
/// failure the temporary file is removed and `path` is left untouched.
pub fn replace_file(
    path: &Path,
    write: impl FnOnce(&mut File) -> Result<(), MapError>,
) -> Result<(), MapError> {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    write(tmp.as_file_mut())?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::Write;
    use tempfile::tempdir;

    #[test]
    fn test_replaces_existing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"old contents").unwrap();

        replace_file(&path, |f| Ok(f.write_all(b"new")?)).unwrap();

        assert_eq!(fs::read(&path).unwrap(), b"new");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_failed_write_keeps_old_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("data.bin");
        fs::write(&path, b"old contents").unwrap();

        let result = replace_file(&path, |f| {
            f.write_all(b"partial")?;
            Err(MapError::InvalidIndex("stop".to_string()))
        });

        assert!(result.is_err());
        assert_eq!(fs::read(&path).unwrap(), b"old contents");
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 1);
    }
}
