//! # Loadshape
//!
//! Differentially private load shapes for synthetic electricity meter cohorts.
//!
//! This crate provides:
//! - Synthesis of randomized meter cohorts ("populations") from a base catalog
//! - A Gaussian-mechanism aggregation engine that clamps, buckets and releases
//!   mean usage vectors with calibrated confidence intervals
//! - A content-addressed result cache that memoizes expensive aggregations
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: Core business types (meter profiles, populations, requests, results)
//! - `ports`: Trait definitions for external operations
//! - `adapters`: Concrete implementations (SQLite, Gaussian mechanism, filesystem cache)
//! - `application`: Use cases orchestrating domain and ports
//! - `config`: Environment-driven runtime configuration

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;

pub use domain::{LoadShapeRequest, MeterProfile, PopulationRecord, PopulationSpec, PrivatizedBucketResult};

/// Result type for Loadshape operations
pub type Result<T> = std::result::Result<T, LoadShapeError>;

/// Main error type for Loadshape
#[derive(Debug, thiserror::Error)]
pub enum LoadShapeError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Insufficient data: {meters} usable meters across {buckets} buckets")]
    InsufficientData { meters: usize, buckets: usize },

    #[error("Meter catalog is empty")]
    EmptyCatalog,

    #[error("Mechanism failed: {0}")]
    Mechanism(#[from] ports::MechanismError),

    #[error("Storage operation failed: {0}")]
    Storage(#[from] adapters::StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Outcome of an entry point that first checks whether its population is queryable.
///
/// A polling caller can tell "data still loading" apart from a real error.
#[derive(Debug, Clone, PartialEq)]
pub enum Readiness<T> {
    /// The population (or catalog) cannot be queried yet.
    NotReady,
    /// The population was ready and the computation succeeded.
    Ready(T),
}

impl<T> Readiness<T> {
    /// Convert into an `Option`, discarding the not-ready distinction.
    #[must_use]
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(v) => Some(v),
            Self::NotReady => None,
        }
    }

    /// Whether this outcome carries a value.
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }

    /// Map the ready value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Readiness<U> {
        match self {
            Self::Ready(v) => Readiness::Ready(f(v)),
            Self::NotReady => Readiness::NotReady,
        }
    }
}
