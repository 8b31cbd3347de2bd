//! Application layer: Use cases and services.
//!
//! This module orchestrates domain logic with ports to implement
//! the core use cases of the application.

pub mod aggregator;
mod cache;
mod load_shape;
mod population;

pub use aggregator::PrivateAggregator;
pub use cache::{cache_key, CacheStats, ResultCache};
pub use load_shape::{LoadShapeReport, LoadShapeService};
pub use population::{population_hash, transform, GenerationReport, PopulationService, PopulationSynthesizer};
