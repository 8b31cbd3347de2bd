//! Filesystem adapter: Implementation of CacheBackend.
//!
//! One file per key inside a single cache directory. Entries are written to a
//! temporary file in the same directory and renamed into place, so a reader
//! never sees a partially written entry.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::ports::{CacheBackend, CacheError, CacheKey};

/// Default cache directory name.
pub const DEFAULT_CACHE_DIR: &str = ".cache_loadshape";

/// Directory-backed cache namespace.
#[derive(Debug, Clone)]
pub struct FsCacheBackend {
    dir: PathBuf,
}

impl FsCacheBackend {
    /// Use `dir` as the cache namespace. The directory is created on first write.
    #[must_use]
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        tracing::debug!("Initializing cache at {}", dir.display());
        Self { dir }
    }

    /// Cache directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn entry_path(&self, key: &CacheKey) -> Result<PathBuf, CacheError> {
        let name = key.as_str();
        if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(CacheError::Corrupted(format!("invalid cache key '{name}'")));
        }
        Ok(self.dir.join(name))
    }
}

impl CacheBackend for FsCacheBackend {
    fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(key)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError> {
        let path = self.entry_path(key)?;
        fs::create_dir_all(&self.dir)?;

        let mut tmp = NamedTempFile::new_in(&self.dir)?;
        tmp.write_all(bytes)?;
        tmp.persist(&path).map_err(|e| CacheError::Io(e.error))?;
        Ok(())
    }

    fn clear(&self) -> Result<(), CacheError> {
        match fs::remove_dir_all(&self.dir) {
            Ok(()) => {
                tracing::info!("Cleared cache at {}", self.dir.display());
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_read_write_clear() {
        let root = tempdir().expect("tempdir");
        let backend = FsCacheBackend::new(root.path().join("cache"));
        let key = CacheKey::new("abc123");

        assert!(backend.read(&key).expect("read").is_none());

        backend.write(&key, b"hello").expect("write");
        assert_eq!(backend.read(&key).expect("read"), Some(b"hello".to_vec()));

        backend.write(&key, b"world").expect("overwrite");
        assert_eq!(backend.read(&key).expect("read"), Some(b"world".to_vec()));

        backend.clear().expect("clear");
        assert!(!backend.dir().exists());
        assert!(backend.read(&key).expect("read").is_none());

        // Clearing an absent namespace is fine.
        backend.clear().expect("clear again");
    }

    #[test]
    fn test_rejects_path_like_keys() {
        let root = tempdir().expect("tempdir");
        let backend = FsCacheBackend::new(root.path());
        assert!(backend.read(&CacheKey::new("../escape")).is_err());
        assert!(backend.write(&CacheKey::new(""), b"x").is_err());
    }
}
