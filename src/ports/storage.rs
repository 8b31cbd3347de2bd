//! Storage port: Trait for the meter catalog and population tables.
//!
//! This trait abstracts the storage backend (SQLite) from the application logic.
//! The core only filters and fetches; schema and connections belong to adapters.

use crate::domain::{MeterProfile, PopulationRecord};

/// Progress marker for the catalog/population load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadState {
    /// Whether the last load ran to completion
    pub finished: bool,

    /// Digest of the population definitions the stored populations were built from
    pub population_hash: Option<String>,
}

/// Trait for local storage operations.
pub trait MeterStore: Send + Sync {
    /// Error type for storage operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Insert or replace catalog profiles.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn save_meter_profiles(&self, profiles: &[MeterProfile]) -> Result<(), Self::Error>;

    /// Load every catalog profile.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn query_meter_catalog(&self) -> Result<Vec<MeterProfile>, Self::Error>;

    /// Append rows for one population atomically.
    ///
    /// # Errors
    /// Returns error if storage operation fails; no rows are written in that case.
    fn append_population(&self, records: &[PopulationRecord]) -> Result<(), Self::Error>;

    /// Load all rows of one population.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn query_population_rows(&self, label: &str) -> Result<Vec<PopulationRecord>, Self::Error>;

    /// Count rows of one population.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn count_population_rows(&self, label: &str) -> Result<usize, Self::Error>;

    /// Distinct population labels, sorted.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn population_labels(&self) -> Result<Vec<String>, Self::Error>;

    /// Delete every population row.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn clear_populations(&self) -> Result<(), Self::Error>;

    /// Record the load state.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn save_load_state(&self, state: &LoadState) -> Result<(), Self::Error>;

    /// Read the load state.
    ///
    /// # Returns
    /// `None` if no load has been recorded.
    ///
    /// # Errors
    /// Returns error if storage operation fails.
    fn load_state(&self) -> Result<Option<LoadState>, Self::Error>;
}
