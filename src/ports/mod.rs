//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the application and external systems (storage, noise, cache).

mod cache;
mod privacy;
mod storage;

pub use cache::{CacheBackend, CacheError, CacheKey};
pub use privacy::{DifferentialPrivacy, MechanismError};
pub use storage::{LoadState, MeterStore};
