//! Domain layer: Core business types and logic.
//!
//! This module contains pure Rust types with no I/O.
//! All types are serializable and implement strict validation.

mod load_shape;
mod meter;
pub mod policy;
mod population;

pub use load_shape::{
    CalibrationPoint, Eligibility, LoadShapeRequest, MeterUsage, PrivatizedBucketResult,
    DEFAULT_CONFIDENCE, HIGH_OUTLIER_METER_ID, HIGH_OUTLIER_SHARE, NUM_BUCKET_CHOICES,
    QUANTILE_CUTOFF_CHOICES, UNCERTAINTY_BOUNDS,
};
pub use meter::{MeterProfile, MeterReadings, PopulationRecord, HOURS_PER_DAY};
pub use population::{PopulationFile, PopulationSpec, ScalingParams, ScalingSpec};
