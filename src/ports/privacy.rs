//! Differential Privacy port: Trait for the vector release mechanism.
//!
//! This trait abstracts the Gaussian mechanism from the aggregation logic.

/// Errors that can occur during noise calibration or release.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MechanismError {
    #[error("Invalid epsilon: {0}")]
    InvalidEpsilon(f64),

    #[error("Invalid delta: {0}")]
    InvalidDelta(f64),

    #[error("Invalid sensitivity: {0}")]
    InvalidSensitivity(f64),

    #[error("Invalid confidence level: {0}")]
    InvalidConfidence(f64),

    #[error("No epsilon yields a confidence interval half-width of {0}")]
    Unsolvable(f64),

    #[error("DP RNG unavailable")]
    RngUnavailable,
}

/// Trait for (epsilon, delta)-differentially private releases.
///
/// Implementations add calibrated noise to a vector whose L2 sensitivity is
/// known, and describe the resulting uncertainty.
pub trait DifferentialPrivacy: Send + Sync {
    /// Standard deviation of the noise added per coordinate.
    ///
    /// # Errors
    /// Returns error if any parameter is out of its domain.
    fn noise_scale(&self, sensitivity: f64, epsilon: f64, delta: f64) -> Result<f64, MechanismError>;

    /// Release `values` with independent noise on every coordinate.
    ///
    /// # Arguments
    /// * `values` - The true vector to protect
    /// * `sensitivity` - L2 sensitivity of the vector
    /// * `epsilon` - Privacy budget for this release
    /// * `delta` - Probability of exceeding the epsilon bound
    ///
    /// # Returns
    /// The noisy vector.
    fn release(
        &self,
        values: &[f64],
        sensitivity: f64,
        epsilon: f64,
        delta: f64,
    ) -> Result<Vec<f64>, MechanismError>;

    /// Half-width of the interval containing the noise with probability `confidence`.
    ///
    /// # Errors
    /// Returns error if any parameter is out of its domain.
    fn confidence_interval(
        &self,
        sensitivity: f64,
        epsilon: f64,
        delta: f64,
        confidence: f64,
    ) -> Result<f64, MechanismError>;

    /// Smallest epsilon whose interval half-width equals `target_ci`.
    ///
    /// # Errors
    /// Returns `MechanismError::Unsolvable` if no positive finite epsilon exists.
    fn epsilon_for_confidence_interval(
        &self,
        target_ci: f64,
        sensitivity: f64,
        delta: f64,
        confidence: f64,
    ) -> Result<f64, MechanismError>;
}
