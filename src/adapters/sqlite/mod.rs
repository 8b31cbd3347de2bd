//! SQLite adapter: Implementation of MeterStore.
//!
//! Provides local persistence for the meter catalog, synthetic populations
//! and the load-state marker.
//!
//! # Mutex Behavior
//!
//! Database connection is protected by `Mutex`. A poisoned mutex (from panic
//! in another thread) will cause panic. This fail-fast behavior is intentional:
//! a half-written population must never be served.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{MeterProfile, PopulationRecord, HOURS_PER_DAY};
use crate::ports::{LoadState, MeterStore};

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Invalid stored row: {0}")]
    InvalidRow(String),
}

/// SQLite storage adapter.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database at the given path.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or initialized.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory SQLite database (for testing).
    ///
    /// # Errors
    /// Returns error if database cannot be created.
    pub fn in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    /// Initialize the database schema.
    fn init_schema(&self) -> Result<(), StorageError> {
        let conn = self.conn.lock().expect("Lock failed");

        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS meter_profile (
                meter_id TEXT NOT NULL,
                hour INTEGER NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (meter_id, hour)
            );

            CREATE TABLE IF NOT EXISTS population (
                population TEXT NOT NULL,
                meter_id TEXT NOT NULL,
                hour INTEGER NOT NULL,
                value REAL NOT NULL,
                PRIMARY KEY (population, meter_id, hour)
            );

            CREATE TABLE IF NOT EXISTS load_state (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                finished INTEGER NOT NULL,
                population_hash TEXT,
                updated_at TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    fn hour_from_row(raw: i64) -> Result<u8, StorageError> {
        u8::try_from(raw)
            .ok()
            .filter(|h| *h < HOURS_PER_DAY)
            .ok_or_else(|| StorageError::InvalidRow(format!("hour {raw} out of range [0, 24)")))
    }
}

impl MeterStore for SqliteStore {
    type Error = StorageError;

    fn save_meter_profiles(&self, profiles: &[MeterProfile]) -> Result<(), Self::Error> {
        let mut conn = self.conn.lock().expect("Lock failed");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR REPLACE INTO meter_profile (meter_id, hour, value) VALUES (?1, ?2, ?3)",
            )?;
            for profile in profiles {
                for (hour, value) in &profile.values {
                    stmt.execute(params![profile.meter_id, i64::from(*hour), value])?;
                }
            }
        }
        tx.commit()?;

        tracing::debug!("Saved {} meter profiles to catalog", profiles.len());
        Ok(())
    }

    fn query_meter_catalog(&self) -> Result<Vec<MeterProfile>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let mut stmt =
            conn.prepare("SELECT meter_id, hour, value FROM meter_profile ORDER BY meter_id, hour")?;
        let rows = stmt
            .query_map([], |row| {
                let meter_id: String = row.get(0)?;
                let hour: i64 = row.get(1)?;
                let value: f64 = row.get(2)?;
                Ok((meter_id, hour, value))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let mut profiles: BTreeMap<String, MeterProfile> = BTreeMap::new();
        for (meter_id, hour, value) in rows {
            let hour = Self::hour_from_row(hour)?;
            profiles
                .entry(meter_id.clone())
                .or_insert_with(|| MeterProfile::new(meter_id, []))
                .values
                .insert(hour, value);
        }

        Ok(profiles.into_values().collect())
    }

    fn append_population(&self, records: &[PopulationRecord]) -> Result<(), Self::Error> {
        let mut conn = self.conn.lock().expect("Lock failed");
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO population (population, meter_id, hour, value) VALUES (?1, ?2, ?3, ?4)",
            )?;
            for r in records {
                stmt.execute(params![r.population, r.meter_id, i64::from(r.hour), r.value])?;
            }
        }
        tx.commit()?;

        tracing::debug!("Appended {} population rows", records.len());
        Ok(())
    }

    fn query_population_rows(&self, label: &str) -> Result<Vec<PopulationRecord>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let mut stmt = conn.prepare(
            r"
            SELECT population, meter_id, hour, value
            FROM population
            WHERE population = ?1
            ORDER BY meter_id, hour
            ",
        )?;

        let rows = stmt
            .query_map(params![label], |row| {
                let population: String = row.get(0)?;
                let meter_id: String = row.get(1)?;
                let hour: i64 = row.get(2)?;
                let value: f64 = row.get(3)?;
                Ok((population, meter_id, hour, value))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        rows.into_iter()
            .map(|(population, meter_id, hour, value)| {
                Ok(PopulationRecord::new(population, meter_id, Self::hour_from_row(hour)?, value))
            })
            .collect()
    }

    fn count_population_rows(&self, label: &str) -> Result<usize, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM population WHERE population = ?1",
            params![label],
            |row| row.get(0),
        )?;

        Ok(count as usize)
    }

    fn population_labels(&self) -> Result<Vec<String>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let mut stmt = conn.prepare("SELECT DISTINCT population FROM population ORDER BY population")?;
        let labels = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;

        Ok(labels)
    }

    fn clear_populations(&self) -> Result<(), Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        conn.execute("DELETE FROM population", [])?;
        tracing::warn!("Cleared all population rows from storage");
        Ok(())
    }

    fn save_load_state(&self, state: &LoadState) -> Result<(), Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");
        let now = chrono::Utc::now().to_rfc3339();

        conn.execute(
            r"
            INSERT OR REPLACE INTO load_state (id, finished, population_hash, updated_at)
            VALUES (1, ?1, ?2, ?3)
            ",
            params![i64::from(state.finished), state.population_hash, now],
        )?;

        Ok(())
    }

    fn load_state(&self) -> Result<Option<LoadState>, Self::Error> {
        let conn = self.conn.lock().expect("Lock failed");

        let state = conn
            .query_row(
                "SELECT finished, population_hash FROM load_state WHERE id = 1",
                [],
                |row| {
                    let finished: i64 = row.get(0)?;
                    let population_hash: Option<String> = row.get(1)?;
                    Ok(LoadState {
                        finished: finished != 0,
                        population_hash,
                    })
                },
            )
            .optional()?;

        Ok(state)
    }
}
