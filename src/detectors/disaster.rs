//! P0: catch catastrophic site-wide failures overnight. spec.md §4.2.

use super::Detector;
use crate::alert::{Alert, AlertDetails, DetectorKind, Priority, Severity};
use crate::dataset::model::{CleanDataset, Dimension, Metric};
use crate::registry::PropertyConfig;
use crate::stats::{self, KernelSignal};
use std::collections::BTreeSet;

const PRIOR_WINDOW_DAYS: i64 = 3;

pub struct DisasterDetector;

enum Trigger {
    SessionsFloor { observed: f64, baseline: f64 },
    ConversionsZero { baseline: f64 },
    SessionsDrop { observed: f64, baseline: f64, drop_pct: f64 },
}

impl Detector for DisasterDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Disaster
    }

    fn detect(&self, property: &PropertyConfig, dataset: &CleanDataset, generated_at: chrono::DateTime<chrono::Utc>) -> Vec<Alert> {
        if !property.dimension_enabled(Dimension::Overall) {
            return vec![];
        }
        let yesterday = dataset.reference_date;
        let sessions_series = dataset.trailing(Dimension::Overall, "", Metric::Sessions, 4);
        let conversions_series = dataset.trailing(Dimension::Overall, "", Metric::Conversions, 4);

        let sessions_yesterday = sessions_series.iter().find(|(d, _)| *d == yesterday).map(|(_, v)| *v);
        let conversions_yesterday = conversions_series.iter().find(|(d, _)| *d == yesterday).map(|(_, v)| *v);

        // "If the prior-3-day window is incomplete, do not emit" — require
        // all 3 prior days present, not merely `min_n` of them.
        let sessions_prior = stats::prior_mean(&sessions_series, yesterday, PRIOR_WINDOW_DAYS, PRIOR_WINDOW_DAYS as usize);
        let conversions_prior = stats::prior_mean(&conversions_series, yesterday, PRIOR_WINDOW_DAYS, PRIOR_WINDOW_DAYS as usize);

        let mut triggers = Vec::new();

        let sessions_min_floor = property.volume_overrides.disaster_min_sessions.unwrap_or(100.0);

        if let (Some(observed), KernelSignal::Value(baseline)) = (sessions_yesterday, sessions_prior) {
            if observed < 10.0 && baseline >= sessions_min_floor {
                triggers.push(Trigger::SessionsFloor { observed, baseline });
            }
            if baseline >= sessions_min_floor {
                let drop_pct = (baseline - observed) / baseline;
                if drop_pct >= 0.90 {
                    triggers.push(Trigger::SessionsDrop { observed, baseline, drop_pct });
                }
            }
        }

        if let (Some(observed), KernelSignal::Value(baseline)) = (conversions_yesterday, conversions_prior) {
            if observed == 0.0 && baseline >= 1.0 {
                triggers.push(Trigger::ConversionsZero { baseline });
            }
        }

        triggers
            .into_iter()
            .map(|trigger| self.build_alert(property, yesterday, trigger, generated_at))
            .collect()
    }
}

impl DisasterDetector {
    fn build_alert(&self, property: &PropertyConfig, date: chrono::NaiveDate, trigger: Trigger, generated_at: chrono::DateTime<chrono::Utc>) -> Alert {
        let mut methods = BTreeSet::new();
        methods.insert("threshold".to_string());

        let (metric, observed_value, baseline_value, delta, business_impact, message) = match trigger {
            Trigger::ConversionsZero { baseline } => (
                Metric::Conversions,
                0.0,
                baseline,
                -1.0,
                100,
                format!("{}: conversions dropped to zero (3-day baseline {baseline:.1})", property.display_name),
            ),
            Trigger::SessionsFloor { observed, baseline } => (
                Metric::Sessions,
                observed,
                baseline,
                (observed - baseline) / baseline,
                95,
                format!("{}: sessions collapsed to {observed:.0} (3-day baseline {baseline:.1})", property.display_name),
            ),
            Trigger::SessionsDrop { observed, baseline, drop_pct } => (
                Metric::Sessions,
                observed,
                baseline,
                -drop_pct,
                85,
                format!("{}: sessions down {:.0}% vs 3-day baseline ({observed:.0} vs {baseline:.1})", property.display_name, drop_pct * 100.0),
            ),
        };

        Alert {
            detector_kind: DetectorKind::Disaster,
            priority: Priority::P0,
            property_id: property.property_id.clone(),
            date,
            dimension: Dimension::Overall,
            dimension_value: String::new(),
            metric,
            observed_value,
            baseline_value,
            delta,
            severity: Severity::Critical,
            business_impact,
            detection_methods: methods,
            message,
            generated_at,
            details: AlertDetails::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::VolumeOverrides;

    fn property() -> PropertyConfig {
        PropertyConfig::test_fixture("p1")
    }

    fn dataset_with(sessions: Vec<f64>, conversions: Vec<f64>) -> CleanDataset {
        let end = chrono::NaiveDate::from_ymd_opt(2026, 7, 14).unwrap();
        let mut ds = CleanDataset::new("p1".into(), end);
        for (i, v) in sessions.iter().enumerate() {
            let date = end - chrono::Duration::days((sessions.len() - 1 - i) as i64);
            ds.insert_point(
                Dimension::Overall,
                crate::dataset::model::MetricPoint { date, dimension_value: String::new(), metric: Metric::Sessions, value: *v },
            );
        }
        for (i, v) in conversions.iter().enumerate() {
            let date = end - chrono::Duration::days((conversions.len() - 1 - i) as i64);
            ds.insert_point(
                Dimension::Overall,
                crate::dataset::model::MetricPoint { date, dimension_value: String::new(), metric: Metric::Conversions, value: *v },
            );
        }
        ds.finalize();
        ds
    }

    #[test]
    fn zero_conversions_disaster_scenario() {
        // spec.md §8 scenario 1
        let conversions = vec![3.0, 4.0, 5.0, 2.0, 3.0, 4.0, 5.0, 3.0, 4.0, 5.0, 3.0, 4.0, 5.0, 0.0];
        let sessions = vec![500.0; 14];
        let ds = dataset_with(sessions, conversions);
        let property = property();
        let alerts = DisasterDetector.detect(&property, &ds, chrono::Utc::now());
        assert_eq!(alerts.len(), 1);
        let a = &alerts[0];
        assert_eq!(a.detector_kind, DetectorKind::Disaster);
        assert_eq!(a.priority, Priority::P0);
        assert_eq!(a.metric, Metric::Conversions);
        assert_eq!(a.observed_value, 0.0);
        assert!((a.baseline_value - 4.0).abs() < 0.01);
        assert_eq!(a.business_impact, 100);
    }

    #[test]
    fn incomplete_prior_window_suppresses_emission() {
        let sessions = vec![500.0, 500.0, 5.0]; // only 2 prior days available
        let ds = dataset_with(sessions, vec![]);
        let alerts = DisasterDetector.detect(&property(), &ds, chrono::Utc::now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn healthy_property_is_all_clear() {
        let sessions = vec![500.0, 510.0, 495.0, 505.0];
        let conversions = vec![4.0, 5.0, 4.0, 5.0];
        let ds = dataset_with(sessions, conversions);
        let alerts = DisasterDetector.detect(&property(), &ds, chrono::Utc::now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn per_property_volume_override_is_honored() {
        let mut property = property();
        property.volume_overrides = VolumeOverrides { disaster_min_sessions: Some(1000.0), ..Default::default() };
        let sessions = vec![500.0, 500.0, 500.0, 5.0]; // baseline 500 < overridden floor 1000
        let ds = dataset_with(sessions, vec![]);
        let alerts = DisasterDetector.detect(&property, &ds, chrono::Utc::now());
        assert!(alerts.is_empty());
    }
}
