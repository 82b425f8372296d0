//! Merges per-detector outputs for all properties into the day's ordered,
//! capped, deduplicated Digest. spec.md §4.6.

use crate::alert::{Alert, DetectorKind, Priority};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

const PER_PROPERTY_CAP: usize = 12;

/// Per-property roll-up: counts and suppression totals. spec.md §4.6.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertyRollup {
    pub property_id: String,
    pub total_alerts: usize,
    pub suppressed_count: usize,
    pub all_clear: bool,
    pub counts_by_detector: BTreeMap<String, usize>,
}

/// A property skipped or a detector that failed, with a reason code.
/// spec.md §7: "the digest always includes an issues section listing
/// properties skipped or detectors failed, with reason codes."
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DigestIssue {
    pub property_id: String,
    pub reason_code: String,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Digest {
    pub generated_at: DateTime<Utc>,
    pub reference_date: NaiveDate,
    pub counts_by_detector: BTreeMap<String, usize>,
    pub alerts: Vec<Alert>,
    pub property_rollups: Vec<PropertyRollup>,
    pub issues: Vec<DigestIssue>,
}

/// Combines the four detector streams into one ordered, capped, deduplicated
/// Digest. Pure: no I/O, no clock reads beyond the passed `reference_date`.
pub struct Consolidator;

impl Consolidator {
    /// `loaded_property_ids` are the properties whose dataset loaded
    /// successfully this run (spec.md §4.8 step 3/4) — every one of them
    /// gets a roll-up, `all_clear: true` when it contributed no surviving
    /// alert, even if `all_alerts` never mentions it at all (spec.md §8
    /// scenario 6, §4.6 "compute 'all clear' when total alerts = 0 for the
    /// property"). `issues` carries load/detector/timeout failures through
    /// to the rendered digest (spec.md §7).
    pub fn consolidate(&self, reference_date: NaiveDate, generated_at: DateTime<Utc>, loaded_property_ids: &[String], all_alerts: Vec<Alert>, issues: Vec<DigestIssue>) -> Digest {
        let deduped = Self::dedup_cross_detector(all_alerts);

        let mut by_property: BTreeMap<String, Vec<Alert>> = BTreeMap::new();
        for id in loaded_property_ids {
            by_property.entry(id.clone()).or_default();
        }
        for alert in deduped {
            by_property.entry(alert.property_id.clone()).or_default().push(alert);
        }

        let mut final_alerts = Vec::new();
        let mut rollups = Vec::new();

        for (property_id, alerts) in by_property {
            let total_before_cap = alerts.len();
            let (kept, suppressed_count) = Self::apply_per_property_cap(alerts);

            let mut counts_by_detector: BTreeMap<String, usize> = BTreeMap::new();
            for a in &kept {
                *counts_by_detector.entry(a.detector_kind.as_str().to_string()).or_insert(0) += 1;
            }

            rollups.push(PropertyRollup {
                property_id,
                total_alerts: kept.len(),
                suppressed_count,
                all_clear: total_before_cap == 0,
                counts_by_detector,
            });

            final_alerts.extend(kept);
        }

        Self::sort_global(&mut final_alerts);

        let mut counts_by_detector: BTreeMap<String, usize> = BTreeMap::new();
        for a in &final_alerts {
            *counts_by_detector.entry(a.detector_kind.as_str().to_string()).or_insert(0) += 1;
        }

        Digest {
            generated_at,
            reference_date,
            counts_by_detector,
            alerts: final_alerts,
            property_rollups: rollups,
            issues,
        }
    }

    /// "If the same (property, date, dimension, dimension_value, metric)
    /// appears in both Record(low) and Trend(down), keep Record(low) and drop
    /// the Trend alert" — spec.md §4.6.
    fn dedup_cross_detector(alerts: Vec<Alert>) -> Vec<Alert> {
        let mut record_low_coords = std::collections::HashSet::new();
        for a in &alerts {
            if a.detector_kind == DetectorKind::Record && a.priority == Priority::P1 {
                record_low_coords.insert(a.coordinate());
            }
        }
        alerts
            .into_iter()
            .filter(|a| !(a.detector_kind == DetectorKind::Trend && a.priority == Priority::P2 && record_low_coords.contains(&a.coordinate())))
            .collect()
    }

    /// Keeps all P0/P1, fills the remaining slots up to `PER_PROPERTY_CAP`
    /// with the highest-`business_impact` P2/P3 alerts. Returns (kept, suppressed_count).
    fn apply_per_property_cap(alerts: Vec<Alert>) -> (Vec<Alert>, usize) {
        let total = alerts.len();
        if total <= PER_PROPERTY_CAP {
            return (alerts, 0);
        }

        let (mut must_keep, mut fillable): (Vec<Alert>, Vec<Alert>) = alerts.into_iter().partition(|a| matches!(a.priority, Priority::P0 | Priority::P1));

        let remaining_slots = PER_PROPERTY_CAP.saturating_sub(must_keep.len());
        fillable.sort_by_key(|a| Reverse(a.business_impact));
        let suppressed = fillable.len().saturating_sub(remaining_slots);
        fillable.truncate(remaining_slots);

        must_keep.extend(fillable);
        (must_keep, suppressed)
    }

    /// priority asc, business_impact desc, property_id asc, date desc,
    /// dimension asc, dimension_value asc — spec.md §4.6/§3.
    fn sort_global(alerts: &mut [Alert]) {
        alerts.sort_by(|a, b| {
            a.priority
                .cmp(&b.priority)
                .then(b.business_impact.cmp(&a.business_impact))
                .then(a.property_id.cmp(&b.property_id))
                .then(b.date.cmp(&a.date))
                .then(a.dimension.cmp(&b.dimension))
                .then(a.dimension_value.cmp(&b.dimension_value))
        });
    }
}

/// Entry count of detector-kind → alert count, kept for the Orchestrator's
/// per-run summary (spec.md §4.8's "alerts per detector").
pub fn count_by_detector(alerts: &[Alert]) -> HashMap<DetectorKind, usize> {
    let mut counts = HashMap::new();
    for a in alerts {
        *counts.entry(a.detector_kind).or_insert(0) += 1;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alert::{AlertDetails, Severity};
    use crate::dataset::model::{Dimension, Metric};
    use std::collections::BTreeSet;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn alert(property_id: &str, kind: DetectorKind, priority: Priority, business_impact: u8) -> Alert {
        Alert {
            detector_kind: kind,
            priority,
            property_id: property_id.to_string(),
            date: d(2026, 7, 23),
            dimension: Dimension::Overall,
            dimension_value: String::new(),
            metric: Metric::Sessions,
            observed_value: 0.0,
            baseline_value: 0.0,
            delta: 0.0,
            severity: Severity::Warning,
            business_impact,
            detection_methods: BTreeSet::new(),
            message: String::new(),
            generated_at: chrono::Utc::now(),
            details: AlertDetails::default(),
        }
    }

    #[test]
    fn cap_enforcement_keeps_p0_p1_and_fills_remainder() {
        // spec.md §8 scenario 5: 3 P0 + 5 P1 + 10 P2 + 20 P3 candidates.
        // 38 total candidates, 12 kept (all 8 P0/P1 plus the top 4 P2/P3 by
        // business_impact), so 26 are suppressed. (The spec's own worked
        // example states 23; see DESIGN.md's Open Question note — the
        // "3+5+top4=12 kept" rule is unambiguous and is what's implemented,
        // so suppressed_count follows arithmetically as 38-12=26.)
        let mut alerts = Vec::new();
        for i in 0..3 {
            alerts.push(alert("acme", DetectorKind::Disaster, Priority::P0, 100 - i));
        }
        for i in 0..5 {
            alerts.push(alert("acme", DetectorKind::Spam, Priority::P1, 90 - i));
        }
        for i in 0..10 {
            alerts.push(alert("acme", DetectorKind::Trend, Priority::P2, 50 - i));
        }
        for i in 0..20 {
            alerts.push(alert("acme", DetectorKind::Record, Priority::P3, 30 - (i % 30) as u8));
        }
        let ids = vec!["acme".to_string()];
        let digest = Consolidator.consolidate(d(2026, 7, 23), chrono::Utc::now(), &ids, alerts, vec![]);
        assert_eq!(digest.alerts.len(), 12);
        assert_eq!(digest.property_rollups[0].suppressed_count, 26);
        assert_eq!(digest.property_rollups[0].total_alerts, 12);
        let p0_p1_count = digest.alerts.iter().filter(|a| matches!(a.priority, Priority::P0 | Priority::P1)).count();
        assert_eq!(p0_p1_count, 8);
    }

    #[test]
    fn all_clear_when_zero_alerts() {
        let digest = Consolidator.consolidate(d(2026, 7, 23), chrono::Utc::now(), &[], vec![], vec![]);
        assert!(digest.property_rollups.is_empty());
        assert!(digest.alerts.is_empty());
    }

    #[test]
    fn healthy_property_gets_an_all_clear_rollup() {
        // spec.md §8 scenario 6: a loaded property with zero surviving alerts
        // still gets an "all clear" roll-up naming it, not silent omission.
        let ids = vec!["acme".to_string()];
        let digest = Consolidator.consolidate(d(2026, 7, 23), chrono::Utc::now(), &ids, vec![], vec![]);
        assert_eq!(digest.property_rollups.len(), 1);
        assert_eq!(digest.property_rollups[0].property_id, "acme");
        assert!(digest.property_rollups[0].all_clear);
    }

    #[test]
    fn record_low_supersedes_trend_down_at_same_coordinate() {
        let mut record_low = alert("acme", DetectorKind::Record, Priority::P1, 60);
        let mut trend_down = alert("acme", DetectorKind::Trend, Priority::P2, 40);
        record_low.metric = Metric::Sessions;
        trend_down.metric = Metric::Sessions;

        let ids = vec!["acme".to_string()];
        let digest = Consolidator.consolidate(d(2026, 7, 23), chrono::Utc::now(), &ids, vec![record_low, trend_down], vec![]);
        assert_eq!(digest.alerts.len(), 1);
        assert_eq!(digest.alerts[0].detector_kind, DetectorKind::Record);
    }

    #[test]
    fn global_ordering_is_priority_then_business_impact() {
        let a = alert("beta", DetectorKind::Trend, Priority::P2, 50);
        let b = alert("acme", DetectorKind::Disaster, Priority::P0, 10);
        let ids = vec!["acme".to_string(), "beta".to_string()];
        let digest = Consolidator.consolidate(d(2026, 7, 23), chrono::Utc::now(), &ids, vec![a, b], vec![]);
        assert_eq!(digest.alerts[0].detector_kind, DetectorKind::Disaster);
        assert_eq!(digest.alerts[1].detector_kind, DetectorKind::Trend);
    }

    #[test]
    fn issues_pass_through_unchanged() {
        let issue = DigestIssue { property_id: "ghost".into(), reason_code: "load_failed".into(), detail: "not found".into() };
        let digest = Consolidator.consolidate(d(2026, 7, 23), chrono::Utc::now(), &[], vec![], vec![issue]);
        assert_eq!(digest.issues.len(), 1);
        assert_eq!(digest.issues[0].property_id, "ghost");
    }
}
