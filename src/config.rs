//! Runtime configuration from environment variables.

use std::path::PathBuf;

use crate::adapters::fs_cache::DEFAULT_CACHE_DIR;
use crate::domain::DEFAULT_CONFIDENCE;

/// Application configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    /// SQLite database holding the catalog and populations
    pub db_path: PathBuf,

    /// Result cache namespace directory
    pub cache_dir: PathBuf,

    /// Population definition file
    pub populations_path: PathBuf,

    /// Raw meter readings imported into the catalog at startup
    pub catalog_path: Option<PathBuf>,

    /// Confidence level of released intervals
    pub confidence: f64,

    /// Epsilon used when none is given on the command line
    pub default_epsilon: f64,

    /// Seed for synthesis and noise. Entropy-seeded when absent.
    pub seed: Option<u64>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("loadshape.db"),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            populations_path: PathBuf::from("populations.json"),
            catalog_path: None,
            confidence: DEFAULT_CONFIDENCE,
            default_epsilon: 1.0,
            seed: None,
        }
    }
}

impl AppConfig {
    /// Load config overrides from environment (best-effort).
    ///
    /// Supported:
    /// - LOADSHAPE_DB_PATH
    /// - LOADSHAPE_CACHE_DIR
    /// - LOADSHAPE_POPULATIONS
    /// - LOADSHAPE_CATALOG
    /// - LOADSHAPE_CONFIDENCE (in (0, 1))
    /// - LOADSHAPE_EPSILON (> 0)
    /// - LOADSHAPE_SEED (u64)
    #[must_use]
    pub fn from_env_or_default() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Same as [`Self::from_env_or_default`] with an explicit variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("LOADSHAPE_DB_PATH").filter(|v| !v.trim().is_empty()) {
            cfg.db_path = PathBuf::from(v.trim());
        }
        if let Some(v) = lookup("LOADSHAPE_CACHE_DIR").filter(|v| !v.trim().is_empty()) {
            cfg.cache_dir = PathBuf::from(v.trim());
        }
        if let Some(v) = lookup("LOADSHAPE_POPULATIONS").filter(|v| !v.trim().is_empty()) {
            cfg.populations_path = PathBuf::from(v.trim());
        }
        if let Some(v) = lookup("LOADSHAPE_CATALOG").filter(|v| !v.trim().is_empty()) {
            cfg.catalog_path = Some(PathBuf::from(v.trim()));
        }

        if let Some(v) = lookup("LOADSHAPE_CONFIDENCE") {
            match v.trim().parse::<f64>() {
                Ok(x) if x > 0.0 && x < 1.0 => cfg.confidence = x,
                _ => tracing::warn!("Ignoring LOADSHAPE_CONFIDENCE={v:?}: expected a number in (0, 1)"),
            }
        }

        if let Some(v) = lookup("LOADSHAPE_EPSILON") {
            match v.trim().parse::<f64>() {
                Ok(x) if x.is_finite() && x > 0.0 => cfg.default_epsilon = x,
                _ => tracing::warn!("Ignoring LOADSHAPE_EPSILON={v:?}: expected a positive number"),
            }
        }

        if let Some(v) = lookup("LOADSHAPE_SEED") {
            match v.trim().parse::<u64>() {
                Ok(x) => cfg.seed = Some(x),
                Err(_) => tracing::warn!("Ignoring LOADSHAPE_SEED={v:?}: expected a u64"),
            }
        }

        cfg
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::from_lookup(lookup(&[]));
        assert_eq!(cfg, AppConfig::default());
        assert_eq!(cfg.cache_dir, PathBuf::from(".cache_loadshape"));
        assert!((cfg.confidence - 0.95).abs() < f64::EPSILON);
    }

    #[test]
    fn test_overrides() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("LOADSHAPE_DB_PATH", "/tmp/ls.db"),
            ("LOADSHAPE_CONFIDENCE", " 0.9 "),
            ("LOADSHAPE_EPSILON", "2.5"),
            ("LOADSHAPE_SEED", "42"),
            ("LOADSHAPE_CATALOG", "catalog.json"),
        ]));
        assert_eq!(cfg.db_path, PathBuf::from("/tmp/ls.db"));
        assert_eq!(cfg.catalog_path, Some(PathBuf::from("catalog.json")));
        assert!((cfg.confidence - 0.9).abs() < f64::EPSILON);
        assert!((cfg.default_epsilon - 2.5).abs() < f64::EPSILON);
        assert_eq!(cfg.seed, Some(42));
    }

    #[test]
    fn test_invalid_values_ignored() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("LOADSHAPE_CONFIDENCE", "1.0"),
            ("LOADSHAPE_EPSILON", "-3"),
            ("LOADSHAPE_SEED", "abc"),
            ("LOADSHAPE_POPULATIONS", "  "),
        ]));
        assert_eq!(cfg, AppConfig::default());
    }
}
