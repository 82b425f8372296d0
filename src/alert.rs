use crate::dataset::model::{Dimension, Metric};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    Disaster,
    Spam,
    Record,
    Trend,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::Disaster => "disaster",
            DetectorKind::Spam => "spam",
            DetectorKind::Record => "record",
            DetectorKind::Trend => "trend",
        }
    }
}

/// P0 highest, P3 lowest. Ord is derived in declaration order so `Priority::P0 < Priority::P1`
/// holds, matching spec.md §4.6's "priority asc (P0 first)".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    P0,
    P1,
    P2,
    P3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Critical,
    Warning,
    Info,
}

/// Detector-specific extras that don't belong on every alert, per spec.md
/// §9's redesign flag ("ad-hoc JSON shapes per detector → unify under the
/// Alert schema... per-detector extras go in a details sub-object").
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_record: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub increase_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decline_pct: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trend_direction: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub percent_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub z_score: Option<f64>,
}

/// A detected deviation. Value object — immutable once emitted (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub detector_kind: DetectorKind,
    pub priority: Priority,
    pub property_id: String,
    pub date: NaiveDate,
    pub dimension: Dimension,
    pub dimension_value: String,
    pub metric: Metric,
    pub observed_value: f64,
    pub baseline_value: f64,
    /// Signed relative change or absolute deviation; detector-specific.
    pub delta: f64,
    pub severity: Severity,
    pub business_impact: u8,
    pub detection_methods: BTreeSet<String>,
    pub message: String,
    pub generated_at: DateTime<Utc>,
    #[serde(default)]
    pub details: AlertDetails,
}

/// Identifies an alert's (property, date, dimension, dimension_value, metric)
/// tuple for cross-detector dedup (spec.md §4.6).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AlertCoordinate {
    pub property_id: String,
    pub date: NaiveDate,
    pub dimension: Dimension,
    pub dimension_value: String,
    pub metric: Metric,
}

impl Alert {
    pub fn coordinate(&self) -> AlertCoordinate {
        AlertCoordinate {
            property_id: self.property_id.clone(),
            date: self.date,
            dimension: self.dimension,
            dimension_value: self.dimension_value.clone(),
            metric: self.metric,
        }
    }
}

/// The `{detector, generated_at, reference_date, properties_analyzed,
/// total_alerts, alerts: [...]}` wrapper from spec.md §6, shared by all four
/// detector artifacts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactEnvelope {
    pub detector: DetectorKind,
    pub generated_at: DateTime<Utc>,
    pub reference_date: NaiveDate,
    pub properties_analyzed: usize,
    pub total_alerts: usize,
    pub alerts: Vec<Alert>,
}

impl ArtifactEnvelope {
    pub fn new(detector: DetectorKind, generated_at: DateTime<Utc>, reference_date: NaiveDate, properties_analyzed: usize, alerts: Vec<Alert>) -> Self {
        Self {
            detector,
            generated_at,
            reference_date,
            properties_analyzed,
            total_alerts: alerts.len(),
            alerts,
        }
    }
}
