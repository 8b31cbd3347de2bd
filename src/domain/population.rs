//! Population definitions.
//!
//! A population is a named synthetic cohort sampled with replacement from the
//! meter catalog, optionally rescaled per meter.

use serde::{Deserialize, Serialize};

/// Scaling fields as written in a population definition.
///
/// Every field is optional here so that a missing one can be reported by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScalingSpec {
    pub lognormal_mean: Option<f64>,
    pub lognormal_sigma: Option<f64>,
    pub gaussian_mean: Option<f64>,
    pub gaussian_sigma: Option<f64>,
}

/// Complete rescaling parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingParams {
    /// Mean of the underlying normal for the per-meter log-normal factor
    pub lognormal_mean: f64,
    /// Sigma of the underlying normal for the per-meter log-normal factor
    pub lognormal_sigma: f64,
    /// Mean of the per-bucket additive Gaussian noise
    pub gaussian_mean: f64,
    /// Standard deviation of the per-bucket additive Gaussian noise
    pub gaussian_sigma: f64,
}

impl ScalingSpec {
    /// Require every field, naming the first missing one.
    ///
    /// # Errors
    /// Returns a message if a field is absent, non-finite, or a sigma is negative.
    pub fn complete(&self) -> Result<ScalingParams, String> {
        let field = |name: &str, v: Option<f64>| -> Result<f64, String> {
            let v = v.ok_or_else(|| format!("Population param 'scaling' must contain field '{name}'"))?;
            if !v.is_finite() {
                return Err(format!("Scaling field '{name}' must be finite, got {v}"));
            }
            Ok(v)
        };

        let params = ScalingParams {
            lognormal_mean: field("lognormal_mean", self.lognormal_mean)?,
            lognormal_sigma: field("lognormal_sigma", self.lognormal_sigma)?,
            gaussian_mean: field("gaussian_mean", self.gaussian_mean)?,
            gaussian_sigma: field("gaussian_sigma", self.gaussian_sigma)?,
        };

        if params.lognormal_sigma < 0.0 {
            return Err(format!("lognormal_sigma {} must be >= 0", params.lognormal_sigma));
        }
        if params.gaussian_sigma < 0.0 {
            return Err(format!("gaussian_sigma {} must be >= 0", params.gaussian_sigma));
        }

        Ok(params)
    }
}

/// Definition of one synthetic population.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSpec {
    /// Population label (unique across the definition file)
    pub label: String,

    /// Number of meters to sample (with replacement)
    #[serde(rename = "n_meters")]
    pub meter_count: usize,

    /// Whether each sampled profile is rescaled
    #[serde(default)]
    pub rescale: bool,

    /// Rescaling parameters; required when `rescale` is set
    #[serde(default)]
    pub scaling: Option<ScalingSpec>,

    /// Seed for this population's sampling and rescaling noise
    #[serde(default)]
    pub random_seed: Option<u64>,
}

impl PopulationSpec {
    /// Create a population without rescaling.
    #[must_use]
    pub fn new(label: impl Into<String>, meter_count: usize) -> Self {
        Self {
            label: label.into(),
            meter_count,
            rescale: false,
            scaling: None,
            random_seed: None,
        }
    }

    /// Enable rescaling with the given parameters.
    #[must_use]
    pub fn with_scaling(mut self, scaling: ScalingSpec) -> Self {
        self.rescale = true;
        self.scaling = Some(scaling);
        self
    }

    /// Fix the seed used to synthesize this population.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.random_seed = Some(seed);
        self
    }

    /// Validate the definition and resolve the rescaling parameters.
    ///
    /// Returns `None` when rescaling is disabled.
    ///
    /// # Errors
    /// Returns a message describing the first configuration problem.
    pub fn validate(&self) -> Result<Option<ScalingParams>, String> {
        if self.label.trim().is_empty() {
            return Err("Population label must not be empty".to_string());
        }
        if !self.rescale {
            return Ok(None);
        }
        let scaling = self
            .scaling
            .as_ref()
            .ok_or_else(|| "Population param 'scaling' is required when 'rescale' is true".to_string())?;
        scaling.complete().map(Some)
    }
}

/// Declarative list of populations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationFile {
    pub populations: Vec<PopulationSpec>,
}

impl PopulationFile {
    /// Parse a population definition document.
    ///
    /// # Errors
    /// Returns error if the document is not valid JSON of the expected shape.
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_scaling() -> ScalingSpec {
        ScalingSpec {
            lognormal_mean: Some(0.0),
            lognormal_sigma: Some(0.5),
            gaussian_mean: Some(0.0),
            gaussian_sigma: Some(0.05),
        }
    }

    #[test]
    fn test_validate_without_rescale() {
        let spec = PopulationSpec::new("residential", 10);
        assert_eq!(spec.validate(), Ok(None));
    }

    #[test]
    fn test_validate_missing_field() {
        let mut scaling = full_scaling();
        scaling.gaussian_sigma = None;
        let spec = PopulationSpec::new("residential", 10).with_scaling(scaling);

        let err = spec.validate().expect_err("missing field should fail");
        assert!(err.contains("gaussian_sigma"));
    }

    #[test]
    fn test_validate_rescale_without_scaling() {
        let mut spec = PopulationSpec::new("residential", 10);
        spec.rescale = true;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn test_parse_population_file() {
        let text = r#"{
            "populations": [
                {"label": "plain", "n_meters": 20, "rescale": false, "scaling": {}},
                {"label": "scaled", "n_meters": 50, "rescale": true, "random_seed": 7,
                 "scaling": {"lognormal_mean": 0.0, "lognormal_sigma": 1.0,
                             "gaussian_mean": 0.0, "gaussian_sigma": 0.1}}
            ]
        }"#;

        let file = PopulationFile::from_json(text).expect("Should parse");
        assert_eq!(file.populations.len(), 2);
        assert_eq!(file.populations[0].meter_count, 20);
        assert_eq!(file.populations[1].random_seed, Some(7));

        let params = file.populations[1]
            .validate()
            .expect("Should validate")
            .expect("Should rescale");
        assert!((params.lognormal_sigma - 1.0).abs() < f64::EPSILON);
    }
}
