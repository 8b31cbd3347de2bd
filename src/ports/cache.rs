//! Cache port: Byte-level persistence for memoized results.

use std::fmt;

/// Short content digest naming one cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Wrap an already computed digest.
    #[must_use]
    pub fn new(digest: impl Into<String>) -> Self {
        Self(digest.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised by cache backends. Never propagated past the result cache.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Cache IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cache entry corrupted: {0}")]
    Corrupted(String),

    #[error("Cache backend unavailable: {0}")]
    Unavailable(String),
}

/// Trait for cache storage.
///
/// Backends are advisory: concurrent writers for the same key may race, and
/// the last writer wins.
pub trait CacheBackend: Send + Sync {
    /// Read the bytes stored under `key`.
    ///
    /// # Returns
    /// `None` on a miss.
    ///
    /// # Errors
    /// Returns error if the backend cannot be read.
    fn read(&self, key: &CacheKey) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store `bytes` under `key`, replacing any previous entry.
    ///
    /// # Errors
    /// Returns error if the backend cannot be written.
    fn write(&self, key: &CacheKey, bytes: &[u8]) -> Result<(), CacheError>;

    /// Remove every entry in the namespace.
    ///
    /// # Errors
    /// Returns error if the namespace cannot be purged.
    fn clear(&self) -> Result<(), CacheError>;
}
