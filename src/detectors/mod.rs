pub mod disaster;
pub mod record;
pub mod spam;
pub mod trend;

use crate::alert::Alert;
use crate::dataset::model::CleanDataset;
use crate::registry::PropertyConfig;
use chrono::{DateTime, Utc};

/// Common shape every detector implements: a pure function from an immutable
/// `CleanDataset` to the alerts it fires for that property on that run.
/// Detectors never raise for domain conditions — they return an empty `Vec`
/// (spec.md §7). `generated_at` is the single per-run timestamp the
/// Orchestrator stamps once (spec.md §9: "introduce an explicit Clock
/// dependency ... forbid direct system-time reads inside detectors"); a
/// detector must never read the wall clock itself, or two runs against
/// identical inputs would never produce byte-identical output (spec.md §5,
/// §8).
pub trait Detector: Send + Sync {
    fn kind(&self) -> crate::alert::DetectorKind;
    fn detect(&self, property: &PropertyConfig, dataset: &CleanDataset, generated_at: DateTime<Utc>) -> Vec<Alert>;
}

/// The four detectors run for every property, in spec.md §4.2–§4.5 order.
pub fn all() -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(disaster::DisasterDetector),
        Box::new(spam::SpamDetector),
        Box::new(record::RecordDetector),
        Box::new(trend::TrendDetector),
    ]
}
