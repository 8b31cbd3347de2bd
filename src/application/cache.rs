//! Result cache: content-addressed memoization over a cache backend.
//!
//! The cache is advisory. Storage failures never reach the caller: a failing
//! read or write degrades to calling the producer directly, and is counted and
//! logged so the degradation stays visible.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha224};

use crate::ports::{CacheBackend, CacheError, CacheKey};

/// Number of hex characters kept from the digest.
const KEY_LEN: usize = 15;

/// Envelope persisted for every entry.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry<T> {
    stored_at: chrono::DateTime<chrono::Utc>,
    value: T,
}

/// Stable short digest of the canonical JSON form of `params`.
///
/// Struct fields serialize in declaration order; use ordered maps for
/// map-like parameters.
///
/// # Errors
/// Returns error if `params` cannot be serialized.
pub fn cache_key<P: Serialize + ?Sized>(params: &P) -> Result<CacheKey, serde_json::Error> {
    let canonical = serde_json::to_vec(params)?;
    let digest = hex::encode(Sha224::digest(&canonical));
    Ok(CacheKey::new(&digest[..KEY_LEN]))
}

/// Counters describing cache behaviour since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Backend or decoding failures converted into misses
    pub swallowed_errors: u64,
}

/// Memoizes serializable results under digest keys.
pub struct ResultCache<B: CacheBackend> {
    backend: B,
    hits: AtomicU64,
    misses: AtomicU64,
    swallowed_errors: AtomicU64,
}

impl<B: CacheBackend> ResultCache<B> {
    /// Create a cache over the given backend.
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            swallowed_errors: AtomicU64::new(0),
        }
    }

    /// Return the value stored under `key`, or compute, store and return it.
    ///
    /// Producer errors are returned as-is and nothing is stored. Cache
    /// failures on the read path call the producer without storing its
    /// result; failures on the write path still return the computed value.
    pub fn cache_func<T, E, F>(&self, key: &CacheKey, producer: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, E>,
    {
        match self.backend.read(key) {
            Ok(Some(bytes)) => match serde_json::from_slice::<CacheEntry<T>>(&bytes) {
                Ok(entry) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    tracing::debug!("Cache hit for {key} (stored {})", entry.stored_at);
                    Ok(entry.value)
                }
                Err(e) => {
                    self.misses.fetch_add(1, Ordering::Relaxed);
                    self.swallow(key, &CacheError::Corrupted(e.to_string()));
                    producer()
                }
            },
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("Cache miss for {key}");
                let value = producer()?;
                self.store(key, &value);
                Ok(value)
            }
            Err(e) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.swallow(key, &e);
                producer()
            }
        }
    }

    fn store<T: Serialize>(&self, key: &CacheKey, value: &T) {
        let entry = CacheEntry {
            stored_at: chrono::Utc::now(),
            value,
        };
        let result = serde_json::to_vec(&entry)
            .map_err(|e| CacheError::Corrupted(e.to_string()))
            .and_then(|bytes| self.backend.write(key, &bytes));
        if let Err(e) = result {
            self.swallow(key, &e);
        }
    }

    fn swallow(&self, key: &CacheKey, error: &CacheError) {
        let total = self.swallowed_errors.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::warn!("Cache bypassed for {key}: {error} ({total} swallowed so far)");
    }

    /// Purge the whole namespace.
    ///
    /// # Errors
    /// Returns error if the backend cannot be purged.
    pub fn clear(&self) -> Result<(), CacheError> {
        self.backend.clear()
    }

    /// Snapshot of the cache counters.
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            swallowed_errors: self.swallowed_errors.load(Ordering::Relaxed),
        }
    }
}
