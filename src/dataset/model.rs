use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The breakdown axis a metric point belongs to. spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Overall,
    Geography,
    Device,
    TrafficSource,
    LandingPage,
}

impl Dimension {
    pub fn as_str(&self) -> &'static str {
        match self {
            Dimension::Overall => "overall",
            Dimension::Geography => "geography",
            Dimension::Device => "device",
            Dimension::TrafficSource => "traffic_source",
            Dimension::LandingPage => "landing_page",
        }
    }
}

/// One of the metrics the clean dataset carries. spec.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    Sessions,
    Users,
    PageViews,
    Conversions,
    BounceRate,
    AvgSessionDuration,
}

impl Metric {
    pub fn as_str(&self) -> &'static str {
        match self {
            Metric::Sessions => "sessions",
            Metric::Users => "users",
            Metric::PageViews => "page_views",
            Metric::Conversions => "conversions",
            Metric::BounceRate => "bounce_rate",
            Metric::AvgSessionDuration => "avg_session_duration",
        }
    }
}

/// One day of one metric for one (property, dimension, dimension_value) tuple.
/// spec.md §3. `(property_id, date, dimension, dimension_value, metric)` is
/// unique within a `CleanDataset`; values are never negative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricPoint {
    pub date: NaiveDate,
    /// "" for the `overall` dimension.
    #[serde(default)]
    pub dimension_value: String,
    pub metric: Metric,
    pub value: f64,
}

/// A single (dimension_value) time series: ordered, gap-explicit (a missing
/// day is simply absent, never imputed as zero — spec.md §3).
pub type Series = Vec<(NaiveDate, f64)>;

/// Per property, per load: contiguous-range series grouped by
/// (dimension, dimension_value, metric), ending at
/// `reference_date - settling_days`. spec.md §3.
#[derive(Debug, Clone)]
pub struct CleanDataset {
    pub property_id: String,
    pub reference_date: NaiveDate,
    /// Keyed by (dimension, dimension_value, metric) → chronologically
    /// sorted (date, value) pairs with no duplicate dates.
    series: BTreeMap<(Dimension, String, Metric), Series>,
}

impl CleanDataset {
    pub fn new(property_id: String, reference_date: NaiveDate) -> Self {
        Self {
            property_id,
            reference_date,
            series: BTreeMap::new(),
        }
    }

    pub fn insert_point(&mut self, dimension: Dimension, point: MetricPoint) {
        let key = (dimension, point.dimension_value.clone(), point.metric);
        let entry = self.series.entry(key).or_default();
        entry.push((point.date, point.value));
    }

    /// Sorts every series by date and removes exact-duplicate-date entries,
    /// keeping the last write. The Loader is responsible for calling this
    /// once after all points are inserted (spec.md §6: "Sort order is
    /// unspecified; the Loader sorts on read").
    pub fn finalize(&mut self) {
        for series in self.series.values_mut() {
            series.sort_by_key(|(d, _)| *d);
            series.dedup_by_key(|(d, _)| *d);
        }
    }

    /// The distinct dimension_value strings observed for a dimension.
    pub fn dimension_values(&self, dimension: Dimension) -> Vec<String> {
        let mut values: Vec<String> = self
            .series
            .keys()
            .filter(|(d, _, _)| *d == dimension)
            .map(|(_, v, _)| v.clone())
            .collect();
        values.sort();
        values.dedup();
        values
    }

    pub fn series_for(&self, dimension: Dimension, dimension_value: &str, metric: Metric) -> Option<&Series> {
        self.series.get(&(dimension, dimension_value.to_string(), metric))
    }

    /// The last `n` days of a series ending on `reference_date` (inclusive of
    /// gaps — missing days are simply absent from the returned slice).
    pub fn trailing(&self, dimension: Dimension, dimension_value: &str, metric: Metric, days: i64) -> Series {
        let cutoff = self.reference_date - chrono::Duration::days(days);
        self.series_for(dimension, dimension_value, metric)
            .map(|s| {
                s.iter()
                    .filter(|(d, _)| *d > cutoff && *d <= self.reference_date)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    /// Earliest and latest date present across all series, if any.
    pub fn date_range(&self) -> Option<(NaiveDate, NaiveDate)> {
        let mut min: Option<NaiveDate> = None;
        let mut max: Option<NaiveDate> = None;
        for series in self.series.values() {
            for (d, _) in series {
                min = Some(min.map_or(*d, |m| m.min(*d)));
                max = Some(max.map_or(*d, |m| m.max(*d)));
            }
        }
        min.zip(max)
    }
}

/// The raw wire shape of one property's daily export, per spec.md §6:
/// `clean_dataset/{property_id}/{YYYY-MM-DD}.json`.
#[derive(Debug, Deserialize)]
pub struct CleanDatasetWire {
    pub property_id: String,
    pub reference_date: NaiveDate,
    #[serde(default)]
    pub overall: Vec<WirePoint>,
    #[serde(default)]
    pub geography: Vec<WirePoint>,
    #[serde(default)]
    pub device: Vec<WirePoint>,
    #[serde(default)]
    pub traffic_source: Vec<WirePoint>,
    #[serde(default)]
    pub landing_page: Vec<WirePoint>,
}

#[derive(Debug, Deserialize)]
pub struct WirePoint {
    pub date: NaiveDate,
    #[serde(default)]
    pub dimension_value: String,
    pub metric: Metric,
    pub value: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn trailing_excludes_gaps_and_future_dates() {
        let mut ds = CleanDataset::new("p1".into(), d(2026, 7, 10));
        for (day, v) in [(1, 100.0), (2, 110.0), (5, 90.0), (10, 95.0), (11, 999.0)] {
            ds.insert_point(
                Dimension::Overall,
                MetricPoint {
                    date: d(2026, 7, day),
                    dimension_value: String::new(),
                    metric: Metric::Sessions,
                    value: v,
                },
            );
        }
        ds.finalize();
        let series = ds.trailing(Dimension::Overall, "", Metric::Sessions, 4);
        // days 7..=10 inclusive of reference date, day 11 is beyond reference
        assert_eq!(series, vec![(d(2026, 7, 10), 95.0)]);
    }

    #[test]
    fn dimension_values_are_deduped_and_sorted() {
        let mut ds = CleanDataset::new("p1".into(), d(2026, 7, 10));
        for (value, day) in [("US", 1), ("RU", 2), ("US", 3)] {
            ds.insert_point(
                Dimension::Geography,
                MetricPoint {
                    date: d(2026, 7, day),
                    dimension_value: value.into(),
                    metric: Metric::Sessions,
                    value: 1.0,
                },
            );
        }
        ds.finalize();
        assert_eq!(ds.dimension_values(Dimension::Geography), vec!["RU", "US"]);
    }
}
