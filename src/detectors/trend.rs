//! P2 (down) / P3 (up): sustained directional shifts via short- vs
//! long-window moving-average crossover. spec.md §4.5.

use super::Detector;
use crate::alert::{Alert, AlertDetails, DetectorKind, Priority, Severity};
use crate::dataset::model::{CleanDataset, Dimension, Metric};
use crate::registry::PropertyConfig;
use crate::stats::{self, KernelSignal, MIN_N_ROLLING};
use std::collections::BTreeSet;

const LOOKBACK_DAYS: i64 = 183;
const SHORT_WINDOW_DAYS: i64 = 30;
const LONG_WINDOW_DAYS: i64 = 180;
const TRIGGER_THRESHOLD: f64 = 0.15;
const MAX_ALERTS_PER_DIMENSION: usize = 3;
const DIMENSIONS: [Dimension; 5] = [Dimension::Overall, Dimension::Geography, Dimension::Device, Dimension::TrafficSource, Dimension::LandingPage];
const METRICS: [Metric; 3] = [Metric::Sessions, Metric::Users, Metric::Conversions];

pub struct TrendDetector;

struct Candidate {
    dimension_value: String,
    metric: Metric,
    ma_30: f64,
    ma_180: f64,
    delta_pct: f64,
}

impl Detector for TrendDetector {
    fn kind(&self) -> DetectorKind {
        DetectorKind::Trend
    }

    fn detect(&self, property: &PropertyConfig, dataset: &CleanDataset, generated_at: chrono::DateTime<chrono::Utc>) -> Vec<Alert> {
        let anchor = dataset.reference_date;
        let min_sessions_floor = property.volume_overrides.trend_min_mean_sessions.unwrap_or(50.0);
        let mut alerts = Vec::new();

        for dimension in DIMENSIONS {
            if !property.dimension_enabled(dimension) {
                continue;
            }
            let mut candidates: Vec<Candidate> = Vec::new();
            for dimension_value in dataset.dimension_values(dimension) {
                let sessions_series = dataset.trailing(dimension, &dimension_value, Metric::Sessions, LOOKBACK_DAYS);
                let floor_ok = matches!(
                    stats::rolling_mean(&sessions_series, anchor, LONG_WINDOW_DAYS, MIN_N_ROLLING),
                    KernelSignal::Value(m) if m >= min_sessions_floor
                );
                if !floor_ok {
                    continue;
                }

                for metric in METRICS {
                    let series = dataset.trailing(dimension, &dimension_value, metric, LOOKBACK_DAYS);
                    let ma_30 = stats::rolling_mean(&series, anchor, SHORT_WINDOW_DAYS, MIN_N_ROLLING);
                    let ma_180 = stats::rolling_mean(&series, anchor, LONG_WINDOW_DAYS, MIN_N_ROLLING);
                    if let (KernelSignal::Value(ma_30), KernelSignal::Value(ma_180)) = (ma_30, ma_180) {
                        if ma_180 <= 0.0 {
                            continue;
                        }
                        let delta_pct = (ma_30 - ma_180) / ma_180;
                        if delta_pct.abs() >= TRIGGER_THRESHOLD {
                            candidates.push(Candidate { dimension_value: dimension_value.clone(), metric, ma_30, ma_180, delta_pct });
                        }
                    }
                }
            }

            candidates.sort_by(|a, b| b.delta_pct.abs().partial_cmp(&a.delta_pct.abs()).unwrap());
            candidates.truncate(MAX_ALERTS_PER_DIMENSION);

            for c in candidates {
                alerts.push(self.build_alert(property, anchor, dimension, c, generated_at));
            }
        }
        alerts
    }
}

impl TrendDetector {
    fn build_alert(&self, property: &PropertyConfig, date: chrono::NaiveDate, dimension: Dimension, c: Candidate, generated_at: chrono::DateTime<chrono::Utc>) -> Alert {
        let mut methods = BTreeSet::new();
        methods.insert("ma_crossover".to_string());
        let is_up = c.delta_pct > 0.0;
        let business_impact = (c.delta_pct.abs() * 100.0 * 0.4).round().clamp(0.0, 100.0) as u8;

        Alert {
            detector_kind: DetectorKind::Trend,
            priority: if is_up { Priority::P3 } else { Priority::P2 },
            property_id: property.property_id.clone(),
            date,
            dimension,
            dimension_value: c.dimension_value.clone(),
            metric: c.metric,
            observed_value: c.ma_30,
            baseline_value: c.ma_180,
            delta: c.delta_pct,
            severity: if is_up { Severity::Info } else { Severity::Warning },
            business_impact,
            detection_methods: methods,
            message: format!(
                "{}: {} on {} ({}) trending {} {:.1}% (30d avg {:.1} vs 180d avg {:.1})",
                property.display_name,
                c.metric.as_str(),
                dimension.as_str(),
                if c.dimension_value.is_empty() { "overall" } else { &c.dimension_value },
                if is_up { "up" } else { "down" },
                c.delta_pct.abs() * 100.0,
                c.ma_30,
                c.ma_180,
            ),
            generated_at,
            details: AlertDetails {
                trend_direction: Some(if is_up { "up".to_string() } else { "down".to_string() }),
                percent_change: Some(c.delta_pct * 100.0),
                ..Default::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::model::MetricPoint;

    fn build_dataset_with_crossover(recent: f64, old: f64) -> CleanDataset {
        let anchor = chrono::NaiveDate::from_ymd_opt(2026, 7, 23).unwrap();
        let mut ds = CleanDataset::new("p1".into(), anchor);
        for offset in 0..183 {
            let date = anchor - chrono::Duration::days(offset);
            let value = if offset < 30 { recent } else { old };
            ds.insert_point(Dimension::Overall, MetricPoint { date, dimension_value: String::new(), metric: Metric::Sessions, value });
        }
        ds.finalize();
        ds
    }

    #[test]
    fn trend_down_overall_sessions() {
        // spec.md §8 scenario 4: MA_180 = 1000, MA_30 = 820 (-18%)
        // construct series whose 180d mean is 1000 and 30d mean is 820
        let anchor = chrono::NaiveDate::from_ymd_opt(2026, 7, 23).unwrap();
        let mut ds = CleanDataset::new("p1".into(), anchor);
        for offset in 0..180 {
            let date = anchor - chrono::Duration::days(offset);
            let value = if offset < 30 { 820.0 } else { 1000.0 + (1000.0 - 820.0) * 30.0 / 150.0 };
            ds.insert_point(Dimension::Overall, MetricPoint { date, dimension_value: String::new(), metric: Metric::Sessions, value });
        }
        ds.finalize();
        let property = PropertyConfig::test_fixture("p1");
        let alerts = TrendDetector.detect(&property, &ds, chrono::Utc::now());
        let down = alerts.iter().find(|a| a.metric == Metric::Sessions).expect("expected a trend alert");
        assert_eq!(down.priority, Priority::P2);
        assert_eq!(down.details.trend_direction.as_deref(), Some("down"));
        assert!((down.details.percent_change.unwrap() - (-18.0)).abs() < 1.0);
    }

    #[test]
    fn caps_at_three_alerts_per_dimension() {
        let anchor = chrono::NaiveDate::from_ymd_opt(2026, 7, 23).unwrap();
        let mut ds = CleanDataset::new("p1".into(), anchor);
        for (i, value_name) in ["US", "GB", "DE", "FR", "IN"].iter().enumerate() {
            for offset in 0..183 {
                let date = anchor - chrono::Duration::days(offset);
                let recent = 500.0 + (i as f64 * 50.0);
                let value = if offset < 30 { recent } else { 500.0 };
                ds.insert_point(Dimension::Geography, MetricPoint { date, dimension_value: value_name.to_string(), metric: Metric::Sessions, value });
            }
        }
        ds.finalize();
        let property = PropertyConfig::test_fixture("p1");
        let alerts = TrendDetector.detect(&property, &ds, chrono::Utc::now());
        let geo_alerts: Vec<_> = alerts.iter().filter(|a| a.dimension == Dimension::Geography).collect();
        assert!(geo_alerts.len() <= MAX_ALERTS_PER_DIMENSION);
    }

    #[test]
    fn healthy_trend_is_not_flagged() {
        let ds = build_dataset_with_crossover(500.0, 500.0);
        let property = PropertyConfig::test_fixture("p1");
        assert!(TrendDetector.detect(&property, &ds, chrono::Utc::now()).is_empty());
    }
}
