//! Load shape service: readiness-checked, cached entry points.
//!
//! Every entry point first checks that the requested population is
//! queryable and answers `Readiness::NotReady` otherwise. The prepared
//! aggregator is memoized per request; noise is drawn fresh on every release.

use std::sync::Arc;

use serde::Serialize;

use super::aggregator::PrivateAggregator;
use super::cache::{cache_key, ResultCache};
use crate::domain::{CalibrationPoint, Eligibility, LoadShapeRequest, MeterUsage, PrivatizedBucketResult};
use crate::ports::{CacheBackend, DifferentialPrivacy, MeterStore};
use crate::{LoadShapeError, Readiness};

/// Everything shown for one population at one epsilon.
#[derive(Debug, Clone, Serialize)]
pub struct LoadShapeReport {
    pub population: String,
    pub epsilon: f64,
    pub confidence: f64,
    pub n_meters: usize,
    pub avg_usage: f64,
    pub fifteen_fifteen: Eligibility,
    pub four_eighty: Eligibility,
    pub sensitivity: f64,
    pub delta: f64,
    pub buckets: Vec<PrivatizedBucketResult>,
}

/// Service answering load shape queries for the presentation layer.
pub struct LoadShapeService<S, D, B>
where
    S: MeterStore,
    D: DifferentialPrivacy,
    B: CacheBackend,
{
    store: Arc<S>,
    mechanism: Arc<D>,
    cache: Arc<ResultCache<B>>,
    confidence: f64,
}

impl<S, D, B> LoadShapeService<S, D, B>
where
    S: MeterStore,
    S::Error: Into<crate::adapters::StorageError>,
    D: DifferentialPrivacy,
    B: CacheBackend,
{
    /// Create a new load shape service.
    pub fn new(store: Arc<S>, mechanism: Arc<D>, cache: Arc<ResultCache<B>>, confidence: f64) -> Self {
        Self {
            store,
            mechanism,
            cache,
            confidence,
        }
    }

    /// Whether `population` can be queried: the last load finished and it has rows.
    ///
    /// # Errors
    /// Returns error if storage fails.
    pub fn ready(&self, population: &str) -> Result<bool, LoadShapeError> {
        let finished = self
            .store
            .load_state()
            .map_err(|e| LoadShapeError::Storage(e.into()))?
            .is_some_and(|state| state.finished);
        if !finished {
            return Ok(false);
        }

        let rows = self
            .store
            .count_population_rows(population)
            .map_err(|e| LoadShapeError::Storage(e.into()))?;
        Ok(rows > 0)
    }

    /// Prepared aggregator for `request`, built once per request and cached.
    ///
    /// # Errors
    /// Returns error if the request is invalid, data is insufficient, or storage fails.
    pub fn load_shape(&self, request: &LoadShapeRequest) -> Result<Readiness<PrivateAggregator>, LoadShapeError> {
        if !self.ready(&request.population)? {
            tracing::debug!("Population '{}' is not ready", request.population);
            return Ok(Readiness::NotReady);
        }

        let key = cache_key(request)?;
        let aggregator = self.cache.cache_func(&key, || {
            let rows = self
                .store
                .query_population_rows(&request.population)
                .map_err(|e| LoadShapeError::Storage(e.into()))?;
            PrivateAggregator::build(rows, request, self.confidence)
        })?;

        Ok(Readiness::Ready(aggregator))
    }

    fn with_aggregator<T>(
        &self,
        request: &LoadShapeRequest,
        f: impl FnOnce(&PrivateAggregator) -> Result<T, LoadShapeError>,
    ) -> Result<Readiness<T>, LoadShapeError> {
        match self.load_shape(request)? {
            Readiness::Ready(aggregator) => f(&aggregator).map(Readiness::Ready),
            Readiness::NotReady => Ok(Readiness::NotReady),
        }
    }

    /// Release the load shape at `epsilon`.
    ///
    /// # Errors
    /// Returns error if preparation fails or the mechanism refuses `epsilon`.
    pub fn privatize(
        &self,
        request: &LoadShapeRequest,
        epsilon: f64,
    ) -> Result<Readiness<Vec<PrivatizedBucketResult>>, LoadShapeError> {
        self.with_aggregator(request, |agg| {
            let results = agg.privatize(epsilon, self.mechanism.as_ref())?;
            tracing::info!(
                "Released load shape for '{}' ({} buckets, epsilon={epsilon})",
                request.population,
                results.len()
            );
            Ok(results)
        })
    }

    /// Average usage per retained meter, ordered by meter id.
    ///
    /// # Errors
    /// Returns error if preparation fails.
    pub fn avg_usage_by_meter(&self, request: &LoadShapeRequest) -> Result<Readiness<Vec<MeterUsage>>, LoadShapeError> {
        self.with_aggregator(request, |agg| Ok(agg.avg_usage_by_meter()))
    }

    /// Mean of the per-meter averages.
    ///
    /// # Errors
    /// Returns error if preparation fails.
    pub fn avg_usage(&self, request: &LoadShapeRequest) -> Result<Readiness<f64>, LoadShapeError> {
        self.with_aggregator(request, |agg| Ok(agg.avg_usage()))
    }

    /// # Errors
    /// Returns error if preparation fails.
    pub fn n_meters(&self, request: &LoadShapeRequest) -> Result<Readiness<usize>, LoadShapeError> {
        self.with_aggregator(request, |agg| Ok(agg.n_meters()))
    }

    /// # Errors
    /// Returns error if preparation fails.
    pub fn fifteen_fifteen(&self, request: &LoadShapeRequest) -> Result<Readiness<Eligibility>, LoadShapeError> {
        self.with_aggregator(request, |agg| Ok(agg.fifteen_fifteen()))
    }

    /// # Errors
    /// Returns error if preparation fails.
    pub fn four_eighty(&self, request: &LoadShapeRequest) -> Result<Readiness<Eligibility>, LoadShapeError> {
        self.with_aggregator(request, |agg| Ok(agg.four_eighty()))
    }

    /// Epsilon giving an interval of `uncertainty` times the average meter usage.
    ///
    /// # Errors
    /// Returns error if preparation fails or the target is unsolvable.
    pub fn find_epsilon(&self, request: &LoadShapeRequest, uncertainty: f64) -> Result<Readiness<f64>, LoadShapeError> {
        self.with_aggregator(request, |agg| Ok(agg.find_epsilon(uncertainty, self.mechanism.as_ref())?))
    }

    /// Epsilon/uncertainty calibration curve.
    ///
    /// # Errors
    /// Returns error if preparation fails or a point is unsolvable.
    pub fn epsilon_uncertainty_mapping(
        &self,
        request: &LoadShapeRequest,
    ) -> Result<Readiness<Vec<CalibrationPoint>>, LoadShapeError> {
        self.with_aggregator(request, |agg| Ok(agg.calibration_curve(self.mechanism.as_ref())?))
    }

    /// Release and diagnostics in one report.
    ///
    /// # Errors
    /// Returns error if preparation fails or the mechanism refuses `epsilon`.
    pub fn report(&self, request: &LoadShapeRequest, epsilon: f64) -> Result<Readiness<LoadShapeReport>, LoadShapeError> {
        self.with_aggregator(request, |agg| {
            Ok(LoadShapeReport {
                population: request.population.clone(),
                epsilon,
                confidence: agg.confidence(),
                n_meters: agg.n_meters(),
                avg_usage: agg.avg_usage(),
                fifteen_fifteen: agg.fifteen_fifteen(),
                four_eighty: agg.four_eighty(),
                sensitivity: agg.sensitivity(),
                delta: agg.delta(),
                buckets: agg.privatize(epsilon, self.mechanism.as_ref())?,
            })
        })
    }
}
