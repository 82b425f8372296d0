use clap::Parser;
use sentinel_digest::cli::{Cli, Command};
use sentinel_digest::clock::SystemClock;
use sentinel_digest::config::RunConfig;
use sentinel_digest::dataset::blob_store::{BlobStore, LocalFsBlobStore};
use sentinel_digest::dataset::loader::{parse_and_validate, BlobDatasetLoader, MAX_LOOKBACK_DAYS};
use sentinel_digest::delivery::{DeliveryAdapter, NullDeliveryAdapter, SmtpDeliveryAdapter};
use sentinel_digest::errors::{ConfigError, RunError};
use sentinel_digest::orchestrator::Orchestrator;
use sentinel_digest::registry::PropertyRegistry;
use sentinel_digest::render::DigestRenderer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Exit codes per spec.md §6: 0 success, 2 config error, 3 partial failure
/// (some properties/detectors/artifacts failed but a digest was produced),
/// 4 delivery failure, 5 cancellation or timeout.
const EXIT_SUCCESS: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 2;
const EXIT_PARTIAL_FAILURE: i32 = 3;
const EXIT_DELIVERY_FAILURE: i32 = 4;
const EXIT_CANCELLED_OR_TIMED_OUT: i32 = 5;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("sentinel_digest=info")))
        .init();

    let cli = Cli::parse();
    let code = match cli.command {
        Command::Run { reference_date, properties, detectors, recipients, dry_run } => run_command(reference_date, properties, detectors, recipients, dry_run).await,
        Command::Render { from, out } => render_command(from, out).await,
        Command::Verify { dataset, property_id } => verify_command(dataset, property_id).await,
    };
    std::process::exit(code);
}

async fn run_command(reference_date: Option<String>, properties: Option<Vec<String>>, detectors: Option<Vec<String>>, recipients: Vec<String>, dry_run: bool) -> i32 {
    let reference_date_override = match reference_date {
        Some(raw) => match chrono::NaiveDate::parse_from_str(&raw, "%Y-%m-%d") {
            Ok(d) => Some(d),
            Err(_) => {
                tracing::error!(value = %raw, "--reference-date is not YYYY-MM-DD");
                return EXIT_CONFIG_ERROR;
            }
        },
        None => RunConfig::reference_date_override(),
    };

    let detector_filter = match detectors {
        Some(names) => match sentinel_digest::cli::parse_detector_filter(&names) {
            Ok(kinds) => Some(kinds),
            Err(message) => {
                tracing::error!(%message, "invalid --detectors filter");
                return EXIT_CONFIG_ERROR;
            }
        },
        None => None,
    };

    // Bootstrap a config just to read blob_root/registry_key (spec.md §6's
    // env vars never depend on the property count), then peek at the
    // registry to size the worker pool correctly per spec.md §5's
    // `min(#properties * 4, 16)` rule.
    let bootstrap_config = match RunConfig::from_env(0) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return EXIT_CONFIG_ERROR;
        }
    };
    let store: Arc<dyn BlobStore> = Arc::new(LocalFsBlobStore::new(&bootstrap_config.blob_root));

    let registry = match PropertyRegistry::load(store.clone(), &bootstrap_config.registry_key).await {
        Ok(r) => r.filter(properties.as_deref()),
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return EXIT_CONFIG_ERROR;
        }
    };
    let property_count = registry.enabled_properties().len();
    if property_count == 0 {
        tracing::error!(error = %ConfigError::EmptyEnabledSet, "configuration error");
        return EXIT_CONFIG_ERROR;
    }

    let config = match RunConfig::from_env(property_count) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(error = %e, "configuration error");
            return EXIT_CONFIG_ERROR;
        }
    };

    let delivery: Arc<dyn DeliveryAdapter> = if dry_run || config.smtp.host.is_none() {
        Arc::new(NullDeliveryAdapter)
    } else {
        Arc::new(SmtpDeliveryAdapter::new(config.smtp.clone()))
    };

    let orchestrator = Orchestrator {
        clock: Arc::new(SystemClock::new(None)),
        store: store.clone(),
        loader: Arc::new(BlobDatasetLoader::new(store)),
        delivery,
        config,
    };

    let cancelled = Arc::new(AtomicBool::new(false));
    let ctrl_c_flag = cancelled.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("cancellation requested, finishing in-flight properties");
            ctrl_c_flag.store(true, Ordering::SeqCst);
        }
    });

    let outcome = match orchestrator.run(reference_date_override, properties.as_deref(), detector_filter.as_deref(), &recipients, dry_run, cancelled).await {
        Ok(o) => o,
        Err(e) => {
            if e.downcast_ref::<RunError>().is_some() {
                tracing::error!(error = %e, "run did not complete");
                return EXIT_CANCELLED_OR_TIMED_OUT;
            }
            tracing::error!(error = %e, "configuration error");
            return EXIT_CONFIG_ERROR;
        }
    };

    tracing::info!(
        attempted = outcome.summary.properties_attempted,
        loaded = outcome.summary.properties_loaded,
        failed = outcome.summary.properties_failed,
        alerts = outcome.digest.alerts.len(),
        wall_time_ms = outcome.summary.wall_time.as_millis() as u64,
        "run complete"
    );

    if outcome.summary.issues.iter().any(|i| i.reason_code == "delivery_failed") {
        return EXIT_DELIVERY_FAILURE;
    }
    if outcome.summary.properties_failed > 0 || outcome.summary.issues.iter().any(|i| i.reason_code != "delivery_failed") {
        return EXIT_PARTIAL_FAILURE;
    }
    EXIT_SUCCESS
}

async fn render_command(from: std::path::PathBuf, out: std::path::PathBuf) -> i32 {
    let bytes = match tokio::fs::read(&from).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(path = %from.display(), error = %e, "cannot read digest file");
            return EXIT_CONFIG_ERROR;
        }
    };
    let digest: sentinel_digest::consolidator::Digest = match serde_json::from_slice(&bytes) {
        Ok(d) => d,
        Err(e) => {
            tracing::error!(path = %from.display(), error = %e, "digest file is malformed");
            return EXIT_CONFIG_ERROR;
        }
    };
    let html = DigestRenderer.render_html(&digest);
    if let Err(e) = tokio::fs::write(&out, html.as_bytes()).await {
        tracing::error!(path = %out.display(), error = %e, "cannot write rendered digest");
        return EXIT_CONFIG_ERROR;
    }
    tracing::info!(out = %out.display(), "digest rendered");
    EXIT_SUCCESS
}

async fn verify_command(dataset: std::path::PathBuf, property_id: String) -> i32 {
    let bytes = match tokio::fs::read(&dataset).await {
        Ok(b) => b,
        Err(e) => {
            tracing::error!(path = %dataset.display(), error = %e, "cannot read dataset file");
            return EXIT_CONFIG_ERROR;
        }
    };
    match parse_and_validate(&property_id, &bytes, MAX_LOOKBACK_DAYS) {
        Ok(parsed) => {
            let span = parsed.date_range().map(|(earliest, latest)| (latest - earliest).num_days() + 1).unwrap_or(0);
            tracing::info!(property_id = %parsed.property_id, days_spanned = span, "dataset is valid");
            EXIT_SUCCESS
        }
        Err(e) => {
            tracing::error!(path = %dataset.display(), error = %e, "dataset failed validation");
            EXIT_CONFIG_ERROR
        }
    }
}
