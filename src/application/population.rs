//! Population synthesis: sampled, optionally rescaled meter cohorts.
//!
//! Rescaling happens once here, so every later aggregation of a population
//! sees the same pre-privacy data.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, LogNormal, Normal};
use sha2::{Digest, Sha224};

use crate::domain::{MeterProfile, MeterReadings, PopulationFile, PopulationRecord, PopulationSpec, ScalingParams};
use crate::ports::{LoadState, MeterStore};
use crate::LoadShapeError;

/// Rescale one profile.
///
/// 1. divide by the profile's own maximum (skipped when the maximum is not positive)
/// 2. add independent `N(gaussian_mean, gaussian_sigma)` noise per hour
/// 3. multiply everything by one `LogNormal(lognormal_mean, lognormal_sigma)` factor
///
/// With `scaling = None` the profile is returned unchanged.
///
/// # Errors
/// Returns `Configuration` if the distribution parameters are unusable.
pub fn transform<R: Rng + ?Sized>(
    profile: &MeterProfile,
    scaling: Option<&ScalingParams>,
    rng: &mut R,
) -> Result<MeterProfile, LoadShapeError> {
    let Some(scaling) = scaling else {
        return Ok(profile.clone());
    };

    let noise = Normal::new(scaling.gaussian_mean, scaling.gaussian_sigma)
        .map_err(|e| LoadShapeError::Configuration(format!("gaussian noise: {e}")))?;
    let factor_dist = LogNormal::new(scaling.lognormal_mean, scaling.lognormal_sigma)
        .map_err(|e| LoadShapeError::Configuration(format!("lognormal factor: {e}")))?;

    let max = profile.max_value().filter(|m| m.is_finite() && *m > 0.0);
    if max.is_none() && !profile.is_empty() {
        tracing::warn!("Profile {} has no positive maximum, skipping normalization", profile.meter_id);
    }

    let noisy: Vec<(u8, f64)> = profile
        .values
        .iter()
        .map(|(hour, value)| {
            let normalized = max.map_or(*value, |m| value / m);
            (*hour, normalized + noise.sample(rng))
        })
        .collect();
    let factor = factor_dist.sample(rng);

    Ok(MeterProfile::new(
        profile.meter_id.clone(),
        noisy.into_iter().map(|(hour, v)| (hour, v * factor)),
    ))
}

/// Builds populations by sampling catalog meters with replacement.
pub struct PopulationSynthesizer {
    rng: ChaCha20Rng,
}

impl PopulationSynthesizer {
    /// Create a synthesizer seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self {
            rng: ChaCha20Rng::from_entropy(),
        }
    }

    /// Create a synthesizer with a fixed seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha20Rng::seed_from_u64(seed),
        }
    }

    /// Generate the rows of one population.
    ///
    /// A spec with its own `random_seed` uses that seed instead of the
    /// synthesizer's generator. Synthetic ids are `"{index}_{source_id}"`.
    ///
    /// # Errors
    /// Returns `Configuration` before any sampling if the spec is invalid, and
    /// `EmptyCatalog` if meters are requested from an empty catalog.
    pub fn generate(
        &mut self,
        spec: &PopulationSpec,
        catalog: &[MeterProfile],
    ) -> Result<Vec<PopulationRecord>, LoadShapeError> {
        let scaling = spec.validate().map_err(LoadShapeError::Configuration)?;
        if spec.meter_count > 0 && catalog.is_empty() {
            return Err(LoadShapeError::EmptyCatalog);
        }

        let mut seeded;
        let rng: &mut ChaCha20Rng = match spec.random_seed {
            Some(seed) => {
                seeded = ChaCha20Rng::seed_from_u64(seed);
                &mut seeded
            }
            None => &mut self.rng,
        };

        tracing::info!("Generating meter population '{}' ({} meters)", spec.label, spec.meter_count);

        let mut records = Vec::new();
        for index in 0..spec.meter_count {
            let source = &catalog[rng.gen_range(0..catalog.len())];
            let profile = transform(source, scaling.as_ref(), rng)?;
            let meter_id = format!("{index}_{}", source.meter_id);
            records.extend(
                profile
                    .values
                    .into_iter()
                    .map(|(hour, value)| PopulationRecord::new(spec.label.clone(), meter_id.clone(), hour, value)),
            );
        }

        Ok(records)
    }
}

impl Default for PopulationSynthesizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome of generating every population in a definition file.
#[derive(Debug, Default)]
pub struct GenerationReport {
    /// (label, rows written)
    pub generated: Vec<(String, usize)>,
    /// (label, error)
    pub failed: Vec<(String, LoadShapeError)>,
}

/// SHA-224 hex digest of a population definition document.
#[must_use]
pub fn population_hash(text: &str) -> String {
    hex::encode(Sha224::digest(text.as_bytes()))
}

/// Service persisting synthetic populations.
pub struct PopulationService<S>
where
    S: MeterStore,
{
    store: Arc<S>,
    synthesizer: PopulationSynthesizer,
}

impl<S> PopulationService<S>
where
    S: MeterStore,
    S::Error: Into<crate::adapters::StorageError>,
{
    /// Create a new population service.
    pub fn new(store: Arc<S>, synthesizer: PopulationSynthesizer) -> Self {
        Self { store, synthesizer }
    }

    /// Generate one population and append it to the store.
    ///
    /// Rows are written in a single batch; nothing is written on failure.
    ///
    /// # Errors
    /// Returns error if the spec is invalid or storage fails.
    pub fn generate(&mut self, spec: &PopulationSpec) -> Result<usize, LoadShapeError> {
        let catalog = self
            .store
            .query_meter_catalog()
            .map_err(|e| LoadShapeError::Storage(e.into()))?;
        let records = self.synthesizer.generate(spec, &catalog)?;
        self.store
            .append_population(&records)
            .map_err(|e| LoadShapeError::Storage(e.into()))?;

        tracing::info!("Finished processing population: {} ({} rows)", spec.label, records.len());
        Ok(records.len())
    }

    /// Generate every population in `file`.
    ///
    /// A failing entry is reported and skipped; the others are still generated.
    pub fn generate_all(&mut self, file: &PopulationFile) -> GenerationReport {
        let mut report = GenerationReport::default();
        let mut seen = HashSet::new();

        for spec in &file.populations {
            tracing::info!("Processing population: {}", spec.label);
            let result = if seen.insert(spec.label.as_str()) {
                self.generate(spec)
            } else {
                Err(LoadShapeError::Configuration(format!(
                    "duplicate population label '{}'",
                    spec.label
                )))
            };

            match result {
                Ok(rows) => report.generated.push((spec.label.clone(), rows)),
                Err(e) => {
                    tracing::error!("Population '{}' failed: {e}", spec.label);
                    report.failed.push((spec.label.clone(), e));
                }
            }
        }

        report
    }

    /// Regenerate all populations if the definition file changed since the last load.
    ///
    /// # Returns
    /// `Some(report)` if populations were regenerated, `None` if they were current.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or storage fails.
    pub fn sync(&mut self, path: &Path) -> Result<Option<GenerationReport>, LoadShapeError> {
        let text = std::fs::read_to_string(path)?;
        let hash = population_hash(&text);

        let state = self
            .store
            .load_state()
            .map_err(|e| LoadShapeError::Storage(e.into()))?;
        if let Some(state) = state {
            if state.finished && state.population_hash.as_deref() == Some(hash.as_str()) {
                tracing::info!("Populations are current ({})", &hash[..12]);
                return Ok(None);
            }
        }

        let file = PopulationFile::from_json(&text)?;
        tracing::info!("Loading {} populations from {}", file.populations.len(), path.display());

        self.save_state(false, None)?;
        self.store
            .clear_populations()
            .map_err(|e| LoadShapeError::Storage(e.into()))?;
        let report = self.generate_all(&file);

        // Without the hash the next sync retries the failed populations.
        let hash = report.failed.is_empty().then_some(hash);
        if hash.is_none() {
            tracing::warn!(
                "{} populations failed, they will be regenerated on the next sync",
                report.failed.len()
            );
        }
        self.save_state(true, hash)?;

        Ok(Some(report))
    }

    /// Load raw meter readings from a JSON catalog file into the meter catalog.
    ///
    /// The file holds a list of `{"meter_id": ..., "readings": [[timestamp, value], ...]}`.
    /// Each meter is reduced to its hour-of-day profile; meters without usable
    /// readings are skipped.
    ///
    /// # Returns
    /// Number of profiles stored.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed, or storage fails.
    pub fn import_catalog(&self, path: &Path) -> Result<usize, LoadShapeError> {
        let text = std::fs::read_to_string(path)?;
        let meters: Vec<MeterReadings> = serde_json::from_str(&text)?;

        let profiles: Vec<MeterProfile> = meters
            .iter()
            .map(MeterReadings::to_profile)
            .filter(|profile| {
                if profile.is_empty() {
                    tracing::warn!("Meter {} has no usable readings, skipping", profile.meter_id);
                }
                !profile.is_empty()
            })
            .collect();

        self.store
            .save_meter_profiles(&profiles)
            .map_err(|e| LoadShapeError::Storage(e.into()))?;

        tracing::info!("Imported {} meter profiles from {}", profiles.len(), path.display());
        Ok(profiles.len())
    }

    fn save_state(&self, finished: bool, population_hash: Option<String>) -> Result<(), LoadShapeError> {
        self.store
            .save_load_state(&LoadState {
                finished,
                population_hash,
            })
            .map_err(|e| LoadShapeError::Storage(e.into()))
    }
}
