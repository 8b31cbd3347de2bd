//! Private aggregation of a population's load shape.
//!
//! Turns the rows of one population into a dense meter x bucket matrix of
//! clamped values, then releases its column means through a
//! differentially private mechanism.
//!
//! Pipeline:
//! 1. optional high-outlier injection (20% of the per-hour cohort total)
//! 2. hour -> bucket mapping, mean per (meter, bucket)
//! 3. quantile clamping (rows outside the bounds are dropped, not clipped)
//! 4. pivot, dropping meters with any missing bucket
//! 5. Gaussian release with `delta = 1/n^2` and L2 sensitivity
//!    `sqrt(k) * (upper - lower) / n`

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::domain::{
    CalibrationPoint, Eligibility, LoadShapeRequest, MeterUsage, PopulationRecord,
    PrivatizedBucketResult, HIGH_OUTLIER_METER_ID, HIGH_OUTLIER_SHARE, HOURS_PER_DAY,
};
use crate::ports::{DifferentialPrivacy, MechanismError};
use crate::LoadShapeError;

/// Lower quantile used for clamping. Only the upper cutoff is configurable.
pub const LOWER_QUANTILE: f64 = 0.0;

/// Number of points on the epsilon/uncertainty curve.
pub const CALIBRATION_POINTS: usize = 100;

/// Noise fraction range covered by the calibration curve.
pub const CALIBRATION_RANGE: (f64, f64) = (0.01, 1.0);

/// One (meter, bucket) value after bucketing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub meter_id: String,
    pub bucket: u8,
    pub value: f64,
}

/// Observations that survived clamping, with the bounds used.
#[derive(Debug, Clone, PartialEq)]
pub struct Clamped {
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub retained: Vec<Observation>,
}

/// Quantile with linear interpolation between order statistics.
///
/// `sorted` must be ascending; `q` is clamped to [0, 1]. Returns `None` for
/// an empty slice.
#[must_use]
pub fn quantile(sorted: &[f64], q: f64) -> Option<f64> {
    let last = sorted.len().checked_sub(1)?;
    let pos = q.clamp(0.0, 1.0) * last as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * frac)
}

/// Append a synthetic meter carrying a share of the per-hour cohort total.
#[must_use]
pub fn inject_high_outlier(mut rows: Vec<PopulationRecord>, population: &str) -> Vec<PopulationRecord> {
    let mut totals: BTreeMap<u8, f64> = BTreeMap::new();
    for r in &rows {
        *totals.entry(r.hour).or_insert(0.0) += r.value;
    }
    rows.extend(totals.into_iter().map(|(hour, total)| {
        PopulationRecord::new(population, HIGH_OUTLIER_METER_ID, hour, total * HIGH_OUTLIER_SHARE)
    }));
    rows
}

/// Map hours to buckets and average per (meter, bucket).
#[must_use]
pub fn bucket_rows(rows: &[PopulationRecord], request: &LoadShapeRequest) -> Vec<Observation> {
    let mut groups: BTreeMap<(&str, u8), (f64, usize)> = BTreeMap::new();
    for r in rows {
        let entry = groups
            .entry((r.meter_id.as_str(), request.bucket_of(r.hour)))
            .or_insert((0.0, 0));
        entry.0 += r.value;
        entry.1 += 1;
    }

    groups
        .into_iter()
        .map(|((meter_id, bucket), (sum, count))| Observation {
            meter_id: meter_id.to_string(),
            bucket,
            value: sum / count as f64,
        })
        .collect()
}

/// Drop every observation outside the `[lower_q, upper_q]` quantile band.
///
/// Returns `None` when there are no observations.
#[must_use]
pub fn clamp_observations(observations: Vec<Observation>, lower_q: f64, upper_q: f64) -> Option<Clamped> {
    let mut sorted: Vec<f64> = observations.iter().map(|o| o.value).collect();
    sorted.sort_by(f64::total_cmp);

    let lower_bound = quantile(&sorted, lower_q)?;
    let upper_bound = quantile(&sorted, upper_q)?;
    let retained = observations
        .into_iter()
        .filter(|o| o.value >= lower_bound && o.value <= upper_bound)
        .collect();

    Some(Clamped {
        lower_bound,
        upper_bound,
        retained,
    })
}

/// Clamped, pivoted load shape of one population, ready for release.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivateAggregator {
    population: String,
    confidence: f64,
    lower_bound: f64,
    upper_bound: f64,
    /// Matrix columns, ascending
    buckets: Vec<u8>,
    /// Matrix rows
    meter_ids: Vec<String>,
    /// `meter_ids.len()` x `buckets.len()`
    matrix: Vec<Vec<f64>>,
    /// Every observation inside the clamp bounds, including incomplete meters
    retained: Vec<Observation>,
}

impl PrivateAggregator {
    /// Build the working matrix for `request` from one population's rows.
    ///
    /// Non-finite values and hours outside the day are treated as missing.
    ///
    /// # Errors
    /// Returns `Configuration` for an invalid request or confidence level, and
    /// `InsufficientData` when fewer than 2 complete meters or no buckets remain.
    pub fn build(
        rows: Vec<PopulationRecord>,
        request: &LoadShapeRequest,
        confidence: f64,
    ) -> Result<Self, LoadShapeError> {
        request
            .validate()
            .map_err(|errors| LoadShapeError::Configuration(errors.join("; ")))?;
        if !(confidence > 0.0 && confidence < 1.0) {
            return Err(LoadShapeError::Configuration(format!(
                "confidence {confidence} out of range (0, 1)"
            )));
        }

        let total = rows.len();
        let mut rows: Vec<PopulationRecord> = rows
            .into_iter()
            .filter(|r| r.value.is_finite() && r.hour < HOURS_PER_DAY)
            .collect();
        if rows.len() < total {
            tracing::warn!(
                "Ignoring {} unusable rows of population '{}'",
                total - rows.len(),
                request.population
            );
        }
        if request.high_outlier {
            rows = inject_high_outlier(rows, &request.population);
        }

        let observations = bucket_rows(&rows, request);
        tracing::debug!(
            "Bucketed {} rows into {} observations ({} buckets)",
            rows.len(),
            observations.len(),
            request.num_buckets
        );

        let clamped = clamp_observations(observations, LOWER_QUANTILE, 1.0 - request.quantile_cutoff)
            .ok_or(LoadShapeError::InsufficientData { meters: 0, buckets: 0 })?;

        let buckets: Vec<u8> = clamped
            .retained
            .iter()
            .map(|o| o.bucket)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let mut by_meter: BTreeMap<&str, BTreeMap<u8, f64>> = BTreeMap::new();
        for o in &clamped.retained {
            by_meter.entry(o.meter_id.as_str()).or_default().insert(o.bucket, o.value);
        }

        let mut meter_ids = Vec::new();
        let mut matrix = Vec::new();
        for (meter_id, values) in by_meter {
            let row: Option<Vec<f64>> = buckets.iter().map(|b| values.get(b).copied()).collect();
            if let Some(row) = row {
                meter_ids.push(meter_id.to_string());
                matrix.push(row);
            }
        }

        if matrix.len() < 2 || buckets.is_empty() {
            tracing::warn!(
                "Population '{}' has {} complete meters across {} buckets after clamping",
                request.population,
                matrix.len(),
                buckets.len()
            );
            return Err(LoadShapeError::InsufficientData {
                meters: matrix.len(),
                buckets: buckets.len(),
            });
        }

        tracing::info!(
            "Prepared load shape for '{}': {} meters x {} buckets, bounds [{:.4}, {:.4}]",
            request.population,
            matrix.len(),
            buckets.len(),
            clamped.lower_bound,
            clamped.upper_bound
        );

        Ok(Self {
            population: request.population.clone(),
            confidence,
            lower_bound: clamped.lower_bound,
            upper_bound: clamped.upper_bound,
            buckets,
            meter_ids,
            matrix,
            retained: clamped.retained,
        })
    }

    #[must_use]
    pub fn population(&self) -> &str {
        &self.population
    }

    /// Number of complete meter vectors.
    #[must_use]
    pub fn n(&self) -> usize {
        self.matrix.len()
    }

    /// Vector width.
    #[must_use]
    pub fn k(&self) -> usize {
        self.buckets.len()
    }

    #[must_use]
    pub fn buckets(&self) -> &[u8] {
        &self.buckets
    }

    #[must_use]
    pub fn meter_ids(&self) -> &[String] {
        &self.meter_ids
    }

    /// Clamp bounds `(lower, upper)`.
    #[must_use]
    pub fn bounds(&self) -> (f64, f64) {
        (self.lower_bound, self.upper_bound)
    }

    #[must_use]
    pub fn confidence(&self) -> f64 {
        self.confidence
    }

    /// Retained observations (inside the clamp bounds).
    #[must_use]
    pub fn observations(&self) -> &[Observation] {
        &self.retained
    }

    /// `1 / n^2`.
    #[must_use]
    pub fn delta(&self) -> f64 {
        let n = self.n() as f64;
        1.0 / (n * n)
    }

    /// L2 sensitivity of the mean vector.
    #[must_use]
    pub fn sensitivity(&self) -> f64 {
        (self.k() as f64).sqrt() * (self.upper_bound - self.lower_bound) / self.n() as f64
    }

    /// Column means of the working matrix. No randomness.
    #[must_use]
    pub fn actual_means(&self) -> Vec<f64> {
        let n = self.n() as f64;
        (0..self.k())
            .map(|j| self.matrix.iter().map(|row| row[j]).sum::<f64>() / n)
            .collect()
    }

    /// Release the mean vector.
    ///
    /// # Errors
    /// Returns error if the mechanism refuses the parameters.
    pub fn private_means<D: DifferentialPrivacy + ?Sized>(
        &self,
        epsilon: f64,
        mechanism: &D,
    ) -> Result<Vec<f64>, MechanismError> {
        mechanism.release(&self.actual_means(), self.sensitivity(), epsilon, self.delta())
    }

    /// Confidence interval half-width at `epsilon`.
    ///
    /// # Errors
    /// Returns error if the mechanism refuses the parameters.
    pub fn private_ci<D: DifferentialPrivacy + ?Sized>(
        &self,
        epsilon: f64,
        mechanism: &D,
    ) -> Result<f64, MechanismError> {
        mechanism.confidence_interval(self.sensitivity(), epsilon, self.delta(), self.confidence)
    }

    /// Release the load shape with per-bucket intervals, ordered by bucket.
    ///
    /// # Errors
    /// Returns error if the mechanism refuses the parameters.
    pub fn privatize<D: DifferentialPrivacy + ?Sized>(
        &self,
        epsilon: f64,
        mechanism: &D,
    ) -> Result<Vec<PrivatizedBucketResult>, MechanismError> {
        let actual = self.actual_means();
        let private = self.private_means(epsilon, mechanism)?;
        let ci = self.private_ci(epsilon, mechanism)?;

        Ok(self
            .buckets
            .iter()
            .zip(actual.into_iter().zip(private))
            .map(|(bucket, (actual_mean, private_mean))| PrivatizedBucketResult {
                bucket: *bucket,
                actual_mean,
                private_mean,
                private_ci: ci,
                private_max: private_mean + ci,
                private_min: private_mean - ci,
                noise_added_pct: (actual_mean != 0.0).then(|| ci.abs() / actual_mean),
            })
            .collect())
    }

    /// Smallest epsilon whose interval half-width equals `target_ci`.
    ///
    /// `delta` defaults to `1/n^2`, `confidence` to the aggregator's level.
    ///
    /// # Errors
    /// Returns error if no epsilon achieves the target.
    pub fn epsilon_for_confidence_interval<D: DifferentialPrivacy + ?Sized>(
        &self,
        target_ci: f64,
        delta: Option<f64>,
        confidence: Option<f64>,
        mechanism: &D,
    ) -> Result<f64, MechanismError> {
        mechanism.epsilon_for_confidence_interval(
            target_ci,
            self.sensitivity(),
            delta.unwrap_or_else(|| self.delta()),
            confidence.unwrap_or(self.confidence),
        )
    }

    /// Epsilon giving an interval of `uncertainty` times the average meter usage.
    ///
    /// # Errors
    /// Returns error if no epsilon achieves the target.
    pub fn find_epsilon<D: DifferentialPrivacy + ?Sized>(
        &self,
        uncertainty: f64,
        mechanism: &D,
    ) -> Result<f64, MechanismError> {
        self.epsilon_for_confidence_interval(self.avg_usage() * uncertainty, None, None, mechanism)
    }

    /// Epsilon needed for each noise fraction in the calibration range.
    ///
    /// The target half-width is the noise fraction times the mean clamped observation.
    ///
    /// # Errors
    /// Returns error if any point is unsolvable.
    pub fn calibration_curve<D: DifferentialPrivacy + ?Sized>(
        &self,
        mechanism: &D,
    ) -> Result<Vec<CalibrationPoint>, MechanismError> {
        let mean_usage = self.mean_usage();
        let (start, end) = CALIBRATION_RANGE;
        let step = (end - start) / (CALIBRATION_POINTS - 1) as f64;

        (0..CALIBRATION_POINTS)
            .map(|i| {
                let noise_pct = start + step * i as f64;
                let epsilon =
                    self.epsilon_for_confidence_interval(mean_usage * noise_pct, None, None, mechanism)?;
                Ok(CalibrationPoint { noise_pct, epsilon })
            })
            .collect()
    }

    /// Mean of every retained observation.
    #[must_use]
    pub fn mean_usage(&self) -> f64 {
        self.retained.iter().map(|o| o.value).sum::<f64>() / self.retained.len().max(1) as f64
    }

    /// Average retained usage per meter, ordered by meter id.
    #[must_use]
    pub fn avg_usage_by_meter(&self) -> Vec<MeterUsage> {
        let mut sums: BTreeMap<&str, (f64, usize)> = BTreeMap::new();
        for o in &self.retained {
            let entry = sums.entry(o.meter_id.as_str()).or_insert((0.0, 0));
            entry.0 += o.value;
            entry.1 += 1;
        }
        sums.into_iter()
            .map(|(meter_id, (sum, count))| MeterUsage {
                meter_id: meter_id.to_string(),
                avg_usage: sum / count as f64,
            })
            .collect()
    }

    /// Mean of the per-meter averages.
    #[must_use]
    pub fn avg_usage(&self) -> f64 {
        let usage = self.avg_usage_by_meter();
        usage.iter().map(|u| u.avg_usage).sum::<f64>() / usage.len().max(1) as f64
    }

    /// Meters with at least one retained observation.
    #[must_use]
    pub fn n_meters(&self) -> usize {
        self.avg_usage_by_meter().len()
    }

    /// 15/15 rule: at least 15 meters, none above 15% of total usage.
    #[must_use]
    pub fn fifteen_fifteen(&self) -> Eligibility {
        Eligibility::screen(&self.avg_usage_by_meter(), 15, 0.15)
    }

    /// 4/80 rule: at least 4 meters, none above 80% of total usage.
    #[must_use]
    pub fn four_eighty(&self) -> Eligibility {
        Eligibility::screen(&self.avg_usage_by_meter(), 4, 0.80)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::gaussian::GaussianAdapter;
    use proptest::prelude::*;

    /// Meter `i` reads `base(i) + 0.01 * hour` every hour.
    fn population(n: usize, base: impl Fn(usize) -> f64) -> Vec<PopulationRecord> {
        (0..n)
            .flat_map(|i| {
                let b = base(i);
                (0..24u8).map(move |h| PopulationRecord::new("test", format!("m{i:02}"), h, b + 0.01 * f64::from(h)))
            })
            .collect()
    }

    #[test]
    fn test_quantile_interpolates() {
        let sorted = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&sorted, 0.0), Some(1.0));
        assert_eq!(quantile(&sorted, 1.0), Some(4.0));
        assert!((quantile(&sorted, 0.5).expect("non-empty") - 2.5).abs() < 1e-12);
        // Position 0.9 * 3 = 2.7: 3.0 + 0.7 * (4.0 - 3.0)
        assert!((quantile(&sorted, 0.9).expect("non-empty") - 3.7).abs() < 1e-12);
        assert_eq!(quantile(&[7.0], 0.3), Some(7.0));
        assert_eq!(quantile(&[], 0.5), None);
    }

    #[test]
    fn test_hours_outside_day_are_ignored() {
        let mut rows = population(4, |i| i as f64);
        rows.push(PopulationRecord::new("test", "m00", 24, 1000.0));
        rows.push(PopulationRecord::new("test", "m01", 200, 1000.0));

        let request = LoadShapeRequest::new("test").with_buckets(24);
        let agg = PrivateAggregator::build(rows, &request, 0.95).expect("build");
        assert_eq!(agg.k(), 24);
        assert_eq!(agg.n(), 4);
        assert!(agg.observations().iter().all(|o| o.value < 1000.0));
    }

    #[test]
    fn test_identity_and_single_bucket() {
        let rows = population(3, |i| i as f64);

        let hourly = bucket_rows(&rows, &LoadShapeRequest::new("test").with_buckets(24));
        assert_eq!(hourly.len(), 3 * 24);
        assert!(hourly.iter().all(|o| {
            let source = rows
                .iter()
                .find(|r| r.meter_id == o.meter_id && r.hour == o.bucket)
                .expect("source row");
            source.value == o.value
        }));

        let daily = bucket_rows(&rows, &LoadShapeRequest::new("test").with_buckets(1));
        assert_eq!(daily.len(), 3);
        for o in daily {
            assert_eq!(o.bucket, 0);
            let values: Vec<f64> = rows.iter().filter(|r| r.meter_id == o.meter_id).map(|r| r.value).collect();
            let mean = values.iter().sum::<f64>() / values.len() as f64;
            assert!((o.value - mean).abs() < 1e-12);
        }
    }

    #[test]
    fn test_trims_top_meter_in_twenty_meter_cohort() {
        let request = LoadShapeRequest::new("test").with_buckets(4).with_quantile_cutoff(0.05);
        let agg = PrivateAggregator::build(population(20, |i| i as f64 * 0.5), &request, 0.95)
            .expect("Should build");

        assert_eq!(agg.n(), 19);
        assert_eq!(agg.k(), 4);
        assert!(!agg.meter_ids().contains(&"m19".to_string()));
        let (lower, upper) = agg.bounds();
        assert!((lower - 0.025).abs() < 1e-9);
        assert!(upper > 9.205 && upper < 9.525);
        assert!(agg.matrix.iter().all(|row| row.len() == 4));
    }

    #[test]
    fn test_interval_coverage_at_fixed_epsilon() {
        let request = LoadShapeRequest::new("test").with_buckets(4).with_quantile_cutoff(0.05);
        let agg = PrivateAggregator::build(population(20, |i| i as f64 * 0.5), &request, 0.95)
            .expect("Should build");
        let mechanism = GaussianAdapter::with_seed(11);

        let mut covered = 0usize;
        let mut total = 0usize;
        for _ in 0..1000 {
            for b in agg.privatize(1.0, &mechanism).expect("Should privatize") {
                total += 1;
                if b.private_min <= b.actual_mean && b.actual_mean <= b.private_max {
                    covered += 1;
                }
            }
        }

        let coverage = covered as f64 / total as f64;
        assert!(coverage > 0.93 && coverage < 0.97, "coverage {coverage}");
    }

    #[test]
    fn test_actual_means_are_deterministic() {
        let request = LoadShapeRequest::new("test").with_buckets(8).with_quantile_cutoff(0.02);
        let a = PrivateAggregator::build(population(10, |i| 1.0 + i as f64), &request, 0.95).expect("build");
        let b = PrivateAggregator::build(population(10, |i| 1.0 + i as f64), &request, 0.95).expect("build");
        assert_eq!(a.actual_means(), b.actual_means());
        assert_eq!(a.actual_means(), a.actual_means());
    }

    #[test]
    fn test_privatize_shape() {
        let request = LoadShapeRequest::new("test").with_buckets(12);
        let agg = PrivateAggregator::build(population(5, |i| 1.0 + i as f64), &request, 0.95).expect("build");
        let mechanism = GaussianAdapter::with_seed(5);

        let released = agg.privatize(2.0, &mechanism).expect("privatize");
        assert_eq!(released.len(), 12);
        assert!(released.windows(2).all(|w| w[0].bucket < w[1].bucket));
        for b in &released {
            assert!((b.private_max - b.private_mean - b.private_ci).abs() < 1e-12);
            assert!((b.private_mean - b.private_min - b.private_ci).abs() < 1e-12);
            assert!(b.noise_added_pct.expect("non-zero mean") > 0.0);
        }
    }

    #[test]
    fn test_sensitivity_and_delta() {
        let request = LoadShapeRequest::new("test").with_buckets(4);
        let agg = PrivateAggregator::build(population(4, |i| i as f64), &request, 0.95).expect("build");
        let (lower, upper) = agg.bounds();
        assert!((agg.delta() - 1.0 / 16.0).abs() < 1e-12);
        assert!((agg.sensitivity() - 2.0 * (upper - lower) / 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_inverse_round_trip() {
        let request = LoadShapeRequest::new("test").with_buckets(4);
        let agg = PrivateAggregator::build(population(30, |i| 1.0 + i as f64 * 0.1), &request, 0.95).expect("build");
        let mechanism = GaussianAdapter::with_seed(1);

        let ci = agg.private_ci(0.8, &mechanism).expect("ci");
        let epsilon = agg
            .epsilon_for_confidence_interval(ci, None, None, &mechanism)
            .expect("inverse");
        assert!((epsilon - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_calibration_curve() {
        let request = LoadShapeRequest::new("test");
        let agg = PrivateAggregator::build(population(20, |i| 1.0 + i as f64), &request, 0.95).expect("build");
        let curve = agg.calibration_curve(&GaussianAdapter::with_seed(1)).expect("curve");

        assert_eq!(curve.len(), CALIBRATION_POINTS);
        assert!((curve[0].noise_pct - 0.01).abs() < 1e-12);
        assert!((curve[CALIBRATION_POINTS - 1].noise_pct - 1.0).abs() < 1e-12);
        assert!(curve.windows(2).all(|w| w[1].epsilon < w[0].epsilon));
    }

    #[test]
    fn test_high_outlier_injection() {
        let rows: Vec<PopulationRecord> = ["a", "b"]
            .iter()
            .zip([1.0, 3.0])
            .flat_map(|(id, v)| (0..24u8).map(move |h| PopulationRecord::new("test", *id, h, v)))
            .collect();

        let request = LoadShapeRequest::new("test").with_buckets(1).with_high_outlier(true);
        let agg = PrivateAggregator::build(rows, &request, 0.95).expect("build");

        assert_eq!(agg.n(), 3);
        assert!(agg.meter_ids().contains(&HIGH_OUTLIER_METER_ID.to_string()));
        assert!((agg.actual_means()[0] - (1.0 + 3.0 + 0.8) / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_data() {
        let request = LoadShapeRequest::new("test");
        assert!(matches!(
            PrivateAggregator::build(population(1, |_| 1.0), &request, 0.95),
            Err(LoadShapeError::InsufficientData { meters: 1, .. })
        ));
        assert!(matches!(
            PrivateAggregator::build(Vec::new(), &request, 0.95),
            Err(LoadShapeError::InsufficientData { meters: 0, buckets: 0 })
        ));
    }

    #[test]
    fn test_incomplete_meters_are_dropped() {
        let mut rows = population(4, |i| i as f64);
        rows.retain(|r| !(r.meter_id == "m01" && r.hour == 3));

        let agg = PrivateAggregator::build(rows, &LoadShapeRequest::new("test"), 0.95).expect("build");
        assert_eq!(agg.n(), 3);
        assert!(!agg.meter_ids().contains(&"m01".to_string()));
        // Still counted in the usage diagnostics.
        assert_eq!(agg.n_meters(), 4);
    }

    #[test]
    fn test_invalid_request_is_configuration_error() {
        let request = LoadShapeRequest::new("test").with_buckets(7);
        assert!(matches!(
            PrivateAggregator::build(population(4, |i| i as f64), &request, 0.95),
            Err(LoadShapeError::Configuration(_))
        ));
        assert!(matches!(
            PrivateAggregator::build(population(4, |i| i as f64), &LoadShapeRequest::new("test"), 1.5),
            Err(LoadShapeError::Configuration(_))
        ));
    }

    #[test]
    fn test_fifteen_fifteen() {
        let request = LoadShapeRequest::new("test");

        let fourteen = PrivateAggregator::build(population(14, |_| 1.0), &request, 0.95).expect("build");
        assert_eq!(fourteen.fifteen_fifteen(), Eligibility::Ineligible);

        // 19 meters at ~1 and one at ~2.11: the largest is ~10% of the total.
        let twenty = PrivateAggregator::build(
            population(20, |i| if i == 19 { 19.0 * 0.1 / 0.9 } else { 1.0 }),
            &request,
            0.95,
        )
        .expect("build");
        assert_eq!(twenty.n_meters(), 20);
        assert_eq!(twenty.fifteen_fifteen(), Eligibility::Eligible);
        assert_eq!(twenty.four_eighty(), Eligibility::Eligible);
    }

    proptest! {
        #[test]
        fn prop_clamp_respects_bounds(
            values in prop::collection::vec(0.0f64..100.0, 1..200),
            cutoff in 0.0f64..0.99,
        ) {
            let observations: Vec<Observation> = values
                .iter()
                .enumerate()
                .map(|(i, v)| Observation { meter_id: format!("m{}", i / 4), bucket: (i % 4) as u8, value: *v })
                .collect();

            let clamped = clamp_observations(observations, 0.0, 1.0 - cutoff).expect("non-empty");

            let mut sorted = values.clone();
            sorted.sort_by(f64::total_cmp);
            let last = sorted.len() - 1;

            // Interpolate the order statistics at position q * (m - 1) directly.
            let pos = (1.0 - cutoff) * last as f64;
            let below = sorted[pos.floor() as usize];
            let above = sorted[pos.ceil() as usize];
            let expected_upper = below + (above - below) * (pos - pos.floor());

            prop_assert_eq!(clamped.lower_bound, sorted[0]);
            prop_assert!((clamped.upper_bound - expected_upper).abs() <= 1e-9);
            prop_assert!(!clamped.retained.is_empty());
            for o in &clamped.retained {
                prop_assert!(clamped.lower_bound <= o.value && o.value <= clamped.upper_bound);
            }
        }

        #[test]
        fn prop_zero_cutoff_keeps_maximum(values in prop::collection::vec(-50.0f64..100.0, 1..200)) {
            let observations: Vec<Observation> = values
                .iter()
                .enumerate()
                .map(|(i, v)| Observation { meter_id: format!("m{i}"), bucket: 0, value: *v })
                .collect();

            let clamped = clamp_observations(observations, 0.0, 1.0).expect("non-empty");
            let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let min = values.iter().copied().fold(f64::INFINITY, f64::min);
            prop_assert_eq!(clamped.upper_bound, max);
            prop_assert_eq!(clamped.lower_bound, min);
            prop_assert_eq!(clamped.retained.len(), values.len());
        }
    }
}
