//! P1 (lows) / P3 (highs): 90-day records by dimension. spec.md §4.4.

use super::Detector;
use crate::alert::{Alert, AlertDetails, DetectorKind, Priority, Severity};
use crate::dataset::model::{CleanDataset, Dimension, Metric};
use crate::registry::PropertyConfig;
use crate::stats::{self, KernelSignal, MIN_N_QUARTILE, MIN_N_ROLLING};
use std::collections::BTreeSet;

const WINDOW_DAYS: i64 = 90;
const MARGIN_DAYS: i64 = 2;
const SIGNIFICANCE_FLOOR_PCT: f64 = 5.0;
const DIMENSIONS: [Dimension; 4] = [Dimension::Overall, Dimension::Device, Dimension::TrafficSource, Dimension::LandingPage];
const METRICS: [Metric; 3] = [Metric::Sessions, Metric::Users, Metric::Conversions];

pub struct RecordDetector;

impl Detector for RecordDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Record
    }

    fn detect(&self, property: &PropertyConfig, dataset: &CleanDataset, generated_at: chrono::DateTime<chrono::Utc>) -> Vec<Alert> {
        let anchor = dataset.reference_date;
        let mut alerts = Vec::new();
        let min_sessions_floor = property.volume_overrides.record_min_mean_sessions.unwrap_or(100.0);

        for dimension in DIMENSIONS {
            if !property.dimension_enabled(dimension) {
                continue;
            }
            for dimension_value in dataset.dimension_values(dimension) {
                let sessions_series = dataset.trailing(dimension, &dimension_value, Metric::Sessions, WINDOW_DAYS + MARGIN_DAYS + 1);
                let sessions_floor_ok = matches!(
                    stats::rolling_mean(&sessions_series, anchor, WINDOW_DAYS, MIN_N_ROLLING),
                    KernelSignal::Value(m) if m >= min_sessions_floor
                );
                if !sessions_floor_ok {
                    continue;
                }

                for metric in METRICS {
                    let series = dataset.trailing(dimension, &dimension_value, metric, WINDOW_DAYS + MARGIN_DAYS + 1);
                    let Some(&(_, yesterday_value)) = series.iter().find(|(d, _)| *d == anchor) else { continue };

                    if let KernelSignal::Value(max) = stats::historical_max(&series, anchor, WINDOW_DAYS, MARGIN_DAYS, MIN_N_QUARTILE) {
                        if yesterday_value > max.value && max.value > 0.0 {
                            let increase_pct = (yesterday_value - max.value) / max.value * 100.0;
                            if increase_pct >= SIGNIFICANCE_FLOOR_PCT {
                                alerts.push(self.build_alert(property, anchor, dimension, &dimension_value, metric, yesterday_value, max.value, increase_pct, true, generated_at));
                            }
                        }
                    }
                    if let KernelSignal::Value(min) = stats::historical_min(&series, anchor, WINDOW_DAYS, MARGIN_DAYS, MIN_N_QUARTILE) {
                        if yesterday_value < min.value && min.value > 0.0 {
                            let decline_pct = (min.value - yesterday_value) / min.value * 100.0;
                            if decline_pct >= SIGNIFICANCE_FLOOR_PCT {
                                alerts.push(self.build_alert(property, anchor, dimension, &dimension_value, metric, yesterday_value, min.value, decline_pct, false, generated_at));
                            }
                        }
                    }
                }
            }
        }
        alerts
    }
}

impl RecordDetector {
    #[allow(clippy::too_many_arguments)]
    fn build_alert(
        &self,
        property: &PropertyConfig,
        date: chrono::NaiveDate,
        dimension: Dimension,
        dimension_value: &str,
        metric: Metric,
        observed_value: f64,
        previous_record: f64,
        delta_pct: f64,
        is_high: bool,
        generated_at: chrono::DateTime<chrono::Utc>,
    ) -> Alert {
        let mut methods = BTreeSet::new();
        methods.insert("historical_extremum".to_string());

        let business_impact = if is_high {
            (delta_pct * 1.5).round().clamp(0.0, 100.0) as u8
        } else {
            ((delta_pct * 1.5).round() as i64).clamp(40, 100) as u8
        };

        let message = if is_high {
            format!(
                "{}: {} on {} ({}) hit a 90-day high of {observed_value:.1}, up {delta_pct:.1}% from {previous_record:.1}",
                property.display_name,
                metric.as_str(),
                dimension.as_str(),
                if dimension_value.is_empty() { "overall" } else { dimension_value }
            )
        } else {
            format!(
                "{}: {} on {} ({}) hit a 90-day low of {observed_value:.1}, down {delta_pct:.1}% from {previous_record:.1}",
                property.display_name,
                metric.as_str(),
                dimension.as_str(),
                if dimension_value.is_empty() { "overall" } else { dimension_value }
            )
        };

        Alert {
            detector_kind: DetectorKind::Record,
            priority: if is_high { Priority::P3 } else { Priority::P1 },
            property_id: property.property_id.clone(),
            date,
            dimension,
            dimension_value: dimension_value.to_string(),
            metric,
            observed_value,
            baseline_value: previous_record,
            delta: if is_high { delta_pct } else { -delta_pct },
            severity: if is_high { Severity::Info } else { Severity::Warning },
            business_impact,
            detection_methods: methods,
            message,
            generated_at,
            details: AlertDetails {
                previous_record: Some(previous_record),
                increase_pct: if is_high { Some(delta_pct) } else { None },
                decline_pct: if is_high { None } else { Some(delta_pct) },
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::model::MetricPoint;
    use crate::registry::PropertyConfig;

    fn build_dataset(sessions: impl Fn(i64) -> f64) -> CleanDataset {
        let anchor = chrono::NaiveDate::from_ymd_opt(2026, 7, 23).unwrap();
        let mut ds = CleanDataset::new("p1".into(), anchor);
        for offset in 0..93 {
            let date = anchor - chrono::Duration::days(offset);
            ds.insert_point(
                Dimension::Device,
                MetricPoint { date, dimension_value: "mobile".into(), metric: Metric::Sessions, value: sessions(offset) },
            );
        }
        ds.finalize();
        ds
    }

    #[test]
    fn record_high_on_device_mobile() {
        // spec.md §8 scenario 3
        let ds = build_dataset(|offset| if offset == 0 { 1500.0 } else if offset == 31 { 1200.0 } else { 900.0 });
        let property = PropertyConfig::test_fixture("p1");
        let alerts = RecordDetector.detect(&property, &ds, chrono::Utc::now());
        let high = alerts.iter().find(|a| a.dimension_value == "mobile" && a.delta > 0.0).expect("expected a high alert");
        assert_eq!(high.priority, Priority::P3);
        assert_eq!(high.details.previous_record, Some(1200.0));
        assert!((high.details.increase_pct.unwrap() - 25.0).abs() < 0.01);
    }

    #[test]
    fn trivial_tick_is_suppressed_by_significance_floor() {
        // yesterday barely above the prior max: 1% increase, below the 5% floor
        let ds = build_dataset(|offset| if offset == 0 { 1010.0 } else if offset == 10 { 1000.0 } else { 500.0 });
        let property = PropertyConfig::test_fixture("p1");
        let alerts = RecordDetector.detect(&property, &ds, chrono::Utc::now());
        assert!(alerts.is_empty());
    }

    #[test]
    fn low_traffic_segment_is_excluded_by_volume_floor() {
        let ds = build_dataset(|offset| if offset == 0 { 50.0 } else { 10.0 });
        let property = PropertyConfig::test_fixture("p1");
        let alerts = RecordDetector.detect(&property, &ds, chrono::Utc::now());
        assert!(alerts.is_empty());
    }
}
