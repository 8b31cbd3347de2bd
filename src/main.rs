//! Loadshape: differentially private load shapes for synthetic meter cohorts.
//!
//! Imports the meter catalog when `LOADSHAPE_CATALOG` names a readings file,
//! regenerates populations when their definition file changed, then prints one
//! JSON report per population. Without a catalog file the catalog already
//! stored in the database is used.
//!
//! # Usage
//!
//! ```bash
//! loadshape [--epsilon <f64>] [--buckets <n>] [--cutoff <q>] [--high-outlier]
//! ```

use std::io::IsTerminal;
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use loadshape::adapters::fs_cache::FsCacheBackend;
use loadshape::adapters::gaussian::GaussianAdapter;
use loadshape::adapters::sqlite::SqliteStore;
use loadshape::application::{LoadShapeService, PopulationService, PopulationSynthesizer, ResultCache};
use loadshape::config::AppConfig;
use loadshape::ports::MeterStore;
use loadshape::{LoadShapeRequest, Readiness};

struct Args {
    epsilon: Option<f64>,
    buckets: u8,
    cutoff: f64,
    high_outlier: bool,
}

fn usage() -> String {
    "Usage: loadshape [--epsilon <f64>] [--buckets <1|2|4|8|12|24>] [--cutoff <q>] [--high-outlier]".to_string()
}

fn parse_args() -> Result<Args, String> {
    let mut args = std::env::args().skip(1);
    let mut parsed = Args {
        epsilon: None,
        buckets: 24,
        cutoff: 0.0,
        high_outlier: false,
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--epsilon" => {
                let v = args.next().ok_or_else(usage)?;
                let x = v
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| "--epsilon must be a number".to_string())?;
                parsed.epsilon = Some(x);
            }
            "--buckets" => {
                let v = args.next().ok_or_else(usage)?;
                parsed.buckets = v
                    .trim()
                    .parse::<u8>()
                    .map_err(|_| "--buckets must be an integer".to_string())?;
            }
            "--cutoff" => {
                let v = args.next().ok_or_else(usage)?;
                parsed.cutoff = v
                    .trim()
                    .parse::<f64>()
                    .map_err(|_| "--cutoff must be a number".to_string())?;
            }
            "--high-outlier" => parsed.high_outlier = true,
            _ => return Err(usage()),
        }
    }

    Ok(parsed)
}

fn main() -> Result<()> {
    let args = parse_args().map_err(anyhow::Error::msg)?;

    // Reports go to stdout, so piped runs log to a file by default.
    let log_mode = std::env::var("LOADSHAPE_LOG_MODE").unwrap_or_else(|_| "auto".to_string());
    let use_file = match log_mode.as_str() {
        "file" => true,
        "stdout" => false,
        _ => !std::io::stdout().is_terminal(),
    };

    let (writer, _guard) = if use_file {
        let log_file = std::env::var("LOADSHAPE_LOG_FILE").unwrap_or_else(|_| "loadshape.log".to_string());
        if let Some(parent) = std::path::Path::new(&log_file).parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_file)
            .with_context(|| format!("Failed to open log file {log_file}"))?;
        tracing_appender::non_blocking(file)
    } else {
        tracing_appender::non_blocking(std::io::stdout())
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(writer))
        .init();

    tracing::info!("Starting Loadshape...");

    let config = AppConfig::from_env_or_default();
    let epsilon = args.epsilon.unwrap_or(config.default_epsilon);

    let store = Arc::new(
        SqliteStore::new(&config.db_path)
            .with_context(|| format!("Failed to open database {}", config.db_path.display()))?,
    );

    let cache = Arc::new(ResultCache::new(FsCacheBackend::new(&config.cache_dir)));
    if let Err(e) = cache.clear() {
        tracing::warn!("Could not clear cache at {}: {e}", config.cache_dir.display());
    }

    let synthesizer = config
        .seed
        .map_or_else(PopulationSynthesizer::new, PopulationSynthesizer::with_seed);
    let mut populations = PopulationService::new(Arc::clone(&store), synthesizer);

    if let Some(catalog_path) = &config.catalog_path {
        populations.import_catalog(catalog_path)?;
    }
    if store.query_meter_catalog()?.is_empty() {
        tracing::warn!("Meter catalog is empty; set LOADSHAPE_CATALOG to a readings file to load one");
    }

    if config.populations_path.exists() {
        if let Some(report) = populations.sync(&config.populations_path)? {
            tracing::info!(
                "Regenerated {} populations ({} failed)",
                report.generated.len(),
                report.failed.len()
            );
        }
    } else {
        tracing::warn!(
            "Population file {} not found, using stored populations",
            config.populations_path.display()
        );
    }

    let mechanism = Arc::new(config.seed.map_or_else(GaussianAdapter::new, GaussianAdapter::with_seed));
    let service = LoadShapeService::new(Arc::clone(&store), mechanism, Arc::clone(&cache), config.confidence);

    for label in store.population_labels()? {
        let request = LoadShapeRequest::new(label.as_str())
            .with_buckets(args.buckets)
            .with_quantile_cutoff(args.cutoff)
            .with_high_outlier(args.high_outlier);

        match service.report(&request, epsilon) {
            Ok(Readiness::Ready(report)) => println!("{}", serde_json::to_string(&report)?),
            Ok(Readiness::NotReady) => tracing::info!("Population '{label}' is not ready yet"),
            Err(e) => tracing::error!("Population '{label}' could not be released: {e}"),
        }
    }

    let stats = cache.stats();
    tracing::info!(
        "Loadshape done (cache hits={}, misses={}, swallowed errors={})",
        stats.hits,
        stats.misses,
        stats.swallowed_errors
    );
    Ok(())
}
