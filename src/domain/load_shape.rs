//! Private load shape request and result types.

use serde::{Deserialize, Serialize};

use super::meter::HOURS_PER_DAY;

/// Bucket counts that evenly divide a day.
pub const NUM_BUCKET_CHOICES: [u8; 6] = [1, 2, 4, 8, 12, 24];

/// Upper quantile cutoffs offered to the analyst.
pub const QUANTILE_CUTOFF_CHOICES: [f64; 6] = [0.0, 0.01, 0.02, 0.03, 0.04, 0.05];

/// Range of the relative uncertainty an analyst may ask for.
pub const UNCERTAINTY_BOUNDS: (f64, f64) = (0.0, 0.5);

/// Default confidence level for released intervals.
pub const DEFAULT_CONFIDENCE: f64 = 0.95;

/// Share of the cohort's per-hour total given to an injected high outlier.
pub const HIGH_OUTLIER_SHARE: f64 = 0.20;

/// Meter identifier used for the injected high outlier.
pub const HIGH_OUTLIER_METER_ID: &str = "high_outlier";

/// Everything that determines one aggregation. Also the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadShapeRequest {
    /// Population label
    pub population: String,

    /// Whether to inject a synthetic high-outlier meter
    pub high_outlier: bool,

    /// Number of time-of-day buckets
    pub num_buckets: u8,

    /// Share of the largest observations to trim, in [0, 1)
    pub quantile_cutoff: f64,
}

impl LoadShapeRequest {
    /// Create a request for the full 24-bucket shape with no trimming.
    #[must_use]
    pub fn new(population: impl Into<String>) -> Self {
        Self {
            population: population.into(),
            high_outlier: false,
            num_buckets: HOURS_PER_DAY,
            quantile_cutoff: 0.0,
        }
    }

    #[must_use]
    pub fn with_high_outlier(mut self, high_outlier: bool) -> Self {
        self.high_outlier = high_outlier;
        self
    }

    #[must_use]
    pub fn with_buckets(mut self, num_buckets: u8) -> Self {
        self.num_buckets = num_buckets;
        self
    }

    #[must_use]
    pub fn with_quantile_cutoff(mut self, quantile_cutoff: f64) -> Self {
        self.quantile_cutoff = quantile_cutoff;
        self
    }

    /// Validate bucket count and cutoff.
    ///
    /// # Errors
    /// Returns validation errors as a vector of strings.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if !NUM_BUCKET_CHOICES.contains(&self.num_buckets) {
            errors.push(format!(
                "num_buckets {} must be one of {:?}",
                self.num_buckets, NUM_BUCKET_CHOICES
            ));
        }
        if !(0.0..1.0).contains(&self.quantile_cutoff) {
            errors.push(format!(
                "quantile_cutoff {} out of range [0, 1)",
                self.quantile_cutoff
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Width of one bucket in hours.
    #[must_use]
    pub fn bucket_width(&self) -> u8 {
        HOURS_PER_DAY / self.num_buckets.max(1)
    }

    /// Bucket an hour of day falls into.
    #[must_use]
    pub fn bucket_of(&self, hour: u8) -> u8 {
        hour / self.bucket_width().max(1)
    }
}

/// Released statistics for one time-of-day bucket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivatizedBucketResult {
    pub bucket: u8,
    pub actual_mean: f64,
    pub private_mean: f64,
    /// Confidence interval half-width
    pub private_ci: f64,
    pub private_max: f64,
    pub private_min: f64,
    /// `private_ci / actual_mean`; `None` when the actual mean is zero
    pub noise_added_pct: Option<f64>,
}

/// One point of the epsilon/uncertainty tradeoff curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CalibrationPoint {
    /// Interval half-width as a fraction of mean usage
    pub noise_pct: f64,
    pub epsilon: f64,
}

/// Average usage of one retained meter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MeterUsage {
    pub meter_id: String,
    pub avg_usage: f64,
}

/// Result of a concentration screen such as the 15/15 rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Eligibility {
    Eligible,
    Ineligible,
}

impl Eligibility {
    /// Apply a "minimum meters / maximum share" screen to per-meter usage.
    #[must_use]
    pub fn screen(usage: &[MeterUsage], min_meters: usize, max_share: f64) -> Self {
        if usage.len() < min_meters {
            return Self::Ineligible;
        }
        let total: f64 = usage.iter().map(|u| u.avg_usage).sum();
        let largest = usage.iter().map(|u| u.avg_usage).fold(f64::NEG_INFINITY, f64::max);
        if total > 0.0 && largest / total < max_share {
            Self::Eligible
        } else {
            Self::Ineligible
        }
    }
}

impl std::fmt::Display for Eligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Eligible => write!(f, "Yes"),
            Self::Ineligible => write!(f, "No"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_request() {
        assert!(LoadShapeRequest::new("p").validate().is_ok());
        assert!(LoadShapeRequest::new("p").with_buckets(5).validate().is_err());
        assert!(LoadShapeRequest::new("p").with_quantile_cutoff(1.0).validate().is_err());
        assert!(LoadShapeRequest::new("p").with_quantile_cutoff(-0.1).validate().is_err());
    }

    #[test]
    fn test_bucket_mapping() {
        let identity = LoadShapeRequest::new("p").with_buckets(24);
        assert!((0..24).all(|h| identity.bucket_of(h) == h));

        let single = LoadShapeRequest::new("p").with_buckets(1);
        assert!((0..24).all(|h| single.bucket_of(h) == 0));

        let quarters = LoadShapeRequest::new("p").with_buckets(4);
        assert_eq!(quarters.bucket_of(5), 0);
        assert_eq!(quarters.bucket_of(6), 1);
        assert_eq!(quarters.bucket_of(23), 3);
    }

    #[test]
    fn test_screen_counts_and_shares() {
        let usage = |values: &[f64]| -> Vec<MeterUsage> {
            values
                .iter()
                .enumerate()
                .map(|(i, v)| MeterUsage {
                    meter_id: i.to_string(),
                    avg_usage: *v,
                })
                .collect()
        };

        assert_eq!(Eligibility::screen(&usage(&[1.0; 14]), 15, 0.15), Eligibility::Ineligible);
        assert_eq!(Eligibility::screen(&usage(&[1.0; 20]), 15, 0.15), Eligibility::Eligible);

        let mut skewed = vec![1.0; 19];
        skewed.push(100.0);
        assert_eq!(Eligibility::screen(&usage(&skewed), 15, 0.15), Eligibility::Ineligible);
    }
}
