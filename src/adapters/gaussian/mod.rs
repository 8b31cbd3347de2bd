//! Gaussian mechanism adapter: Implementation of DifferentialPrivacy.
//!
//! Provides the classical (epsilon, delta) Gaussian mechanism for releasing
//! clamped mean vectors, plus the closed-form inverse from a target interval
//! half-width back to epsilon.
//!
//! ```text
//! sigma   = sensitivity * sqrt(2 ln(1.25 / delta)) / epsilon
//! ci      = z * sigma,             z = Phi^-1((1 + confidence) / 2)
//! epsilon = sensitivity * sqrt(2 ln(1.25 / delta)) * z / ci
//! ```
//!
//! # Mutex Behavior
//!
//! This adapter uses `Mutex` for thread-safe RNG access. A poisoned mutex
//! (from a panic in another thread) fails closed by returning an error.

use std::sync::{Arc, Mutex};

use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};
use statrs::distribution::{ContinuousCDF, Normal as StandardNormal};

use crate::ports::{DifferentialPrivacy, MechanismError};

/// Gaussian mechanism with its own noise generator.
///
/// # Security
///
/// - Noise is drawn from a ChaCha20 CSPRNG seeded from OS entropy
/// - Seeded construction exists for reproducible tests and simulations only
#[derive(Clone)]
pub struct GaussianAdapter {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl GaussianAdapter {
    /// Create a mechanism seeded from OS entropy.
    #[must_use]
    pub fn new() -> Self {
        Self::from_rng(ChaCha20Rng::from_entropy())
    }

    /// Create a mechanism with a fixed seed.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self::from_rng(ChaCha20Rng::seed_from_u64(seed))
    }

    fn from_rng(rng: ChaCha20Rng) -> Self {
        Self {
            rng: Arc::new(Mutex::new(rng)),
        }
    }

    /// `sqrt(2 ln(1.25 / delta))`, the delta-dependent factor of sigma.
    fn delta_factor(delta: f64) -> Result<f64, MechanismError> {
        if !delta.is_finite() || delta <= 0.0 || delta >= 1.0 {
            return Err(MechanismError::InvalidDelta(delta));
        }
        Ok((2.0 * (1.25 / delta).ln()).sqrt())
    }

    /// Two-sided standard normal quantile for `confidence`.
    fn z_score(confidence: f64) -> Result<f64, MechanismError> {
        if !confidence.is_finite() || confidence <= 0.0 || confidence >= 1.0 {
            return Err(MechanismError::InvalidConfidence(confidence));
        }
        let standard = StandardNormal::new(0.0, 1.0).map_err(|_| MechanismError::InvalidConfidence(confidence))?;
        Ok(standard.inverse_cdf(0.5 + confidence / 2.0))
    }

    fn check_sensitivity(sensitivity: f64) -> Result<(), MechanismError> {
        if !sensitivity.is_finite() || sensitivity < 0.0 {
            tracing::error!("Invalid sensitivity: {sensitivity}. Refusing to release statistic.");
            return Err(MechanismError::InvalidSensitivity(sensitivity));
        }
        Ok(())
    }

    fn check_epsilon(epsilon: f64) -> Result<(), MechanismError> {
        if !epsilon.is_finite() || epsilon <= 0.0 {
            tracing::error!("Invalid epsilon: {epsilon}. Refusing to release statistic.");
            return Err(MechanismError::InvalidEpsilon(epsilon));
        }
        Ok(())
    }
}

impl Default for GaussianAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl DifferentialPrivacy for GaussianAdapter {
    fn noise_scale(&self, sensitivity: f64, epsilon: f64, delta: f64) -> Result<f64, MechanismError> {
        Self::check_sensitivity(sensitivity)?;
        Self::check_epsilon(epsilon)?;
        Ok(sensitivity * Self::delta_factor(delta)? / epsilon)
    }

    fn release(
        &self,
        values: &[f64],
        sensitivity: f64,
        epsilon: f64,
        delta: f64,
    ) -> Result<Vec<f64>, MechanismError> {
        let sigma = self.noise_scale(sensitivity, epsilon, delta)?;
        if sigma == 0.0 {
            return Ok(values.to_vec());
        }

        let normal = Normal::new(0.0, sigma).map_err(|_| MechanismError::InvalidSensitivity(sensitivity))?;
        let mut rng = self.rng.lock().map_err(|_| MechanismError::RngUnavailable)?;

        Ok(values.iter().map(|v| v + normal.sample(&mut *rng)).collect())
    }

    fn confidence_interval(
        &self,
        sensitivity: f64,
        epsilon: f64,
        delta: f64,
        confidence: f64,
    ) -> Result<f64, MechanismError> {
        let sigma = self.noise_scale(sensitivity, epsilon, delta)?;
        Ok(Self::z_score(confidence)? * sigma)
    }

    fn epsilon_for_confidence_interval(
        &self,
        target_ci: f64,
        sensitivity: f64,
        delta: f64,
        confidence: f64,
    ) -> Result<f64, MechanismError> {
        Self::check_sensitivity(sensitivity)?;
        if !target_ci.is_finite() || target_ci <= 0.0 || sensitivity == 0.0 {
            return Err(MechanismError::Unsolvable(target_ci));
        }

        let epsilon = sensitivity * Self::delta_factor(delta)? * Self::z_score(confidence)? / target_ci;
        if !epsilon.is_finite() || epsilon <= 0.0 {
            return Err(MechanismError::Unsolvable(target_ci));
        }
        Ok(epsilon)
    }
}
