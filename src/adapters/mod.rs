//! Adapters layer: Concrete implementations of ports.
//!
//! These modules contain the actual integration with external libraries:
//! - `gaussian`: Gaussian mechanism (rand_distr + statrs) for differential privacy
//! - `sqlite`: SQLite for the catalog and population tables
//! - `fs_cache`: filesystem namespace for the result cache

pub mod fs_cache;
pub mod gaussian;
pub mod sqlite;

// Re-export storage error for lib.rs
pub use sqlite::StorageError;
