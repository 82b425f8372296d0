//! Drives one full pipeline run: Clock → Registry → Loader → Detectors
//! (bounded fan-out) → Consolidator → Renderer → Delivery. spec.md §4.8, §5.

use crate::alert::{Alert, ArtifactEnvelope, DetectorKind};
use crate::clock::{analysis_date, Clock};
use crate::config::RunConfig;
use crate::consolidator::{Consolidator, Digest, DigestIssue};
use crate::dataset::blob_store::BlobStore;
use crate::dataset::loader::{DatasetLoader, MAX_LOOKBACK_DAYS};
use crate::delivery::DeliveryAdapter;
use crate::detectors;
use crate::errors::RunError;
use crate::persistence::ArtifactWriter;
use crate::registry::{PropertyConfig, PropertyRegistry};
use crate::render::DigestRenderer;
use chrono::NaiveDate;
use futures_util::future::join_all;
use std::collections::BTreeMap;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// One skipped property, failed (property, detector) pair, or timed-out task,
/// with a reason code — spec.md §7 "the digest always includes an issues
/// section".
#[derive(Debug, Clone)]
pub struct Issue {
    pub property_id: String,
    pub reason_code: String,
    pub detail: String,
}

impl From<Issue> for DigestIssue {
    fn from(i: Issue) -> Self {
        DigestIssue { property_id: i.property_id, reason_code: i.reason_code, detail: i.detail }
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub properties_attempted: usize,
    pub properties_loaded: usize,
    pub properties_failed: usize,
    pub alerts_by_detector: BTreeMap<String, usize>,
    pub wall_time: Duration,
    pub issues: Vec<Issue>,
}

struct PropertyOutcome {
    property_id: String,
    /// `Err` means the property failed entirely (load failure or timeout) and
    /// is excluded from the Digest property count (spec.md §4.8). `Ok` means
    /// the dataset loaded; `detector_issues` records individual detectors
    /// that panicked without aborting the property's other detectors
    /// (spec.md §7 `DetectorError`).
    result: Result<(Vec<Alert>, Vec<Issue>), Issue>,
}

pub struct Orchestrator {
    pub clock: Arc<dyn Clock>,
    pub store: Arc<dyn BlobStore>,
    pub loader: Arc<dyn DatasetLoader>,
    pub delivery: Arc<dyn DeliveryAdapter>,
    pub config: RunConfig,
}

pub struct RunOutcome {
    pub summary: RunSummary,
    pub digest: Digest,
    pub artifacts: BTreeMap<DetectorKind, ArtifactEnvelope>,
}

impl Orchestrator {
    /// Executes one run for the given reference date, optionally restricted
    /// to a subset of properties/detectors (CLI `--properties`/`--detectors`).
    /// Configuration failures and detector/property issues propagate as
    /// `anyhow::Error`; the CLI layer maps the error chain to an exit code
    /// (spec.md §6, §7 — the Orchestrator is "the sole converter of
    /// exceptions into exit codes").
    pub async fn run(&self, reference_date_override: Option<NaiveDate>, property_filter: Option<&[String]>, detector_filter: Option<&[DetectorKind]>, recipients: &[String], dry_run: bool, cancelled: Arc<AtomicBool>) -> anyhow::Result<RunOutcome> {
        let started = Instant::now();
        let reference_date = reference_date_override.unwrap_or_else(|| self.clock.today());
        let analysis = analysis_date(reference_date, self.config.settling_days);

        let run_future = self.run_inner(analysis, property_filter, detector_filter, recipients, dry_run, cancelled.clone());
        let (summary, digest, artifacts) = match tokio::time::timeout(Duration::from_secs(self.config.run_timeout_secs), run_future).await {
            Ok(result) => result?,
            Err(_) => return Err(RunError::TimedOut(Duration::from_secs(self.config.run_timeout_secs)).into()),
        };

        Ok(RunOutcome { summary: RunSummary { wall_time: started.elapsed(), ..summary }, digest, artifacts })
    }

    async fn run_inner(
        &self,
        analysis_date: NaiveDate,
        property_filter: Option<&[String]>,
        detector_filter: Option<&[DetectorKind]>,
        recipients: &[String],
        dry_run: bool,
        cancelled: Arc<AtomicBool>,
    ) -> anyhow::Result<(RunSummary, Digest, BTreeMap<DetectorKind, ArtifactEnvelope>)> {
        let registry = PropertyRegistry::load(self.store.clone(), &self.config.registry_key).await?.filter(property_filter);
        let properties = registry.enabled_properties().to_vec();

        let semaphore = Arc::new(Semaphore::new(self.config.worker_pool_size.max(1)));
        let detectors: Arc<Vec<Box<dyn detectors::Detector>>> = Arc::new(
            detectors::all()
                .into_iter()
                .filter(|d| detector_filter.is_none_or(|kinds| kinds.contains(&d.kind())))
                .collect(),
        );

        let per_property_timeout = Duration::from_secs(self.config.per_property_timeout_secs);
        let outcomes: Arc<Mutex<Vec<PropertyOutcome>>> = Arc::new(Mutex::new(Vec::new()));

        // Single per-run timestamp, threaded into every detector call and
        // stamped on every Alert/ArtifactEnvelope/Digest it produces, so two
        // runs against identical inputs emit byte-identical artifacts
        // (spec.md §5, §8, §9 — detectors never read the wall clock).
        let generated_at = chrono::Utc::now();

        let tasks = properties.into_iter().map(|property| {
            let semaphore = semaphore.clone();
            let loader = self.loader.clone();
            let detectors = detectors.clone();
            let outcomes = outcomes.clone();
            let cancelled = cancelled.clone();
            async move {
                if cancelled.load(Ordering::SeqCst) {
                    outcomes.lock().unwrap().push(PropertyOutcome {
                        property_id: property.property_id.clone(),
                        result: Err(Issue { property_id: property.property_id.clone(), reason_code: "cancelled".to_string(), detail: "run cancelled before property started".to_string() }),
                    });
                    return;
                }
                let _permit = semaphore.acquire().await.expect("semaphore never closed");
                let outcome = tokio::time::timeout(per_property_timeout, Self::process_property(&property, loader.as_ref(), detectors.as_ref(), analysis_date, generated_at)).await;

                let result = match outcome {
                    Ok(Ok(pair)) => Ok(pair),
                    Ok(Err(issue)) => Err(issue),
                    Err(_) => Err(Issue { property_id: property.property_id.clone(), reason_code: "timed_out".to_string(), detail: "per-property budget exceeded".to_string() }),
                };
                outcomes.lock().unwrap().push(PropertyOutcome { property_id: property.property_id.clone(), result });
            }
        });

        join_all(tasks).await;

        let outcomes = Arc::try_unwrap(outcomes).map(|m| m.into_inner().unwrap()).unwrap_or_default();
        let properties_attempted = outcomes.len();
        let mut properties_loaded = 0;
        let mut properties_failed = 0;
        let mut issues = Vec::new();
        let mut loaded_property_ids = Vec::new();
        let mut all_alerts = Vec::new();

        for outcome in outcomes {
            match outcome.result {
                Ok((alerts, detector_issues)) => {
                    properties_loaded += 1;
                    loaded_property_ids.push(outcome.property_id);
                    all_alerts.extend(alerts);
                    issues.extend(detector_issues);
                }
                Err(issue) => {
                    properties_failed += 1;
                    issues.push(issue);
                }
            }
        }

        let mut artifacts = BTreeMap::new();
        let mut alerts_by_kind: BTreeMap<DetectorKind, Vec<Alert>> = BTreeMap::new();
        for alert in &all_alerts {
            alerts_by_kind.entry(alert.detector_kind).or_default().push(alert.clone());
        }
        let writer = ArtifactWriter::new(self.store.clone(), dry_run);
        for kind in [DetectorKind::Disaster, DetectorKind::Spam, DetectorKind::Record, DetectorKind::Trend] {
            let kind_alerts = alerts_by_kind.remove(&kind).unwrap_or_default();
            let envelope = ArtifactEnvelope::new(kind, generated_at, analysis_date, properties_loaded, kind_alerts);
            let key = format!("results/{}_alerts.json", kind.as_str());
            if let Ok(bytes) = serde_json::to_vec_pretty(&envelope) {
                if let Err(e) = writer.persist_or_log(&key, &bytes).await {
                    issues.push(Issue { property_id: String::new(), reason_code: "persist_failed".to_string(), detail: e.to_string() });
                }
            }
            artifacts.insert(kind, envelope);
        }

        let digest_issues: Vec<DigestIssue> = issues.iter().cloned().map(DigestIssue::from).collect();
        let digest = Consolidator.consolidate(analysis_date, generated_at, &loaded_property_ids, all_alerts, digest_issues);

        if let Ok(bytes) = serde_json::to_vec_pretty(&digest) {
            if let Err(e) = writer.persist_or_log("results/digest.json", &bytes).await {
                issues.push(Issue { property_id: String::new(), reason_code: "persist_failed".to_string(), detail: e.to_string() });
            }
        }
        let renderer = DigestRenderer;
        let html = renderer.render_html(&digest);
        let text = renderer.render_text(&digest);
        if let Err(e) = writer.persist_or_log("results/digest.html", html.as_bytes()).await {
            issues.push(Issue { property_id: String::new(), reason_code: "persist_failed".to_string(), detail: e.to_string() });
        }
        if let Err(e) = writer.persist_or_log("results/digest.txt", text.as_bytes()).await {
            issues.push(Issue { property_id: String::new(), reason_code: "persist_failed".to_string(), detail: e.to_string() });
        }

        if !recipients.is_empty() {
            if let Err(e) = self.delivery.deliver(&html, &text, recipients).await {
                issues.push(Issue { property_id: String::new(), reason_code: "delivery_failed".to_string(), detail: e.to_string() });
            }
        }

        let mut alerts_by_detector = BTreeMap::new();
        for (kind, envelope) in &artifacts {
            alerts_by_detector.insert(kind.as_str().to_string(), envelope.total_alerts);
        }

        Ok((
            RunSummary {
                properties_attempted,
                properties_loaded,
                properties_failed,
                alerts_by_detector,
                wall_time: Duration::default(),
                issues,
            },
            digest,
            artifacts,
        ))
    }

    /// Loads the property's dataset (fatal to the property on failure) then
    /// runs every detector against it. A detector that panics (programmer
    /// error, spec.md §7 `DetectorError`) is caught and recorded as an issue
    /// without aborting the remaining detectors for this property.
    async fn process_property(property: &PropertyConfig, loader: &dyn DatasetLoader, detectors: &[Box<dyn detectors::Detector>], analysis_date: NaiveDate, generated_at: chrono::DateTime<chrono::Utc>) -> Result<(Vec<Alert>, Vec<Issue>), Issue> {
        let dataset = loader.load(&property.property_id, analysis_date, MAX_LOOKBACK_DAYS).await.map_err(|e| Issue {
            property_id: property.property_id.clone(),
            reason_code: "load_failed".to_string(),
            detail: e.to_string(),
        })?;

        let mut alerts = Vec::new();
        let mut detector_issues = Vec::new();
        for detector in detectors {
            let kind = detector.kind();
            match std::panic::catch_unwind(AssertUnwindSafe(|| detector.detect(property, &dataset, generated_at))) {
                Ok(detected) => alerts.extend(detected),
                Err(payload) => {
                    let message = payload.downcast_ref::<&str>().map(|s| s.to_string()).or_else(|| payload.downcast_ref::<String>().cloned()).unwrap_or_else(|| "detector panicked".to_string());
                    let error = crate::errors::DetectorError { detector: kind.as_str(), property_id: property.property_id.clone(), message };
                    tracing::error!(property_id = %property.property_id, detector = kind.as_str(), %error, "detector failed");
                    detector_issues.push(Issue { property_id: property.property_id.clone(), reason_code: "detector_failed".to_string(), detail: error.to_string() });
                }
            }
        }
        Ok((alerts, detector_issues))
    }
}
