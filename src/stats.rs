//! Pure, deterministic, side-effect-free numeric primitives shared by every
//! detector. spec.md §4.1. No I/O, no clock reads.

use chrono::NaiveDate;

/// Returned in place of a numeric result when a primitive does not have
/// enough valid points to be credible. Detectors must treat this as "no
/// signal," never as an anomaly (spec.md §4.1, §7).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum KernelSignal<T> {
    Value(T),
    InsufficientData,
    /// z-score is defined only when stddev > 0.
    Undefined,
}

impl<T> KernelSignal<T> {
    pub fn value(self) -> Option<T> {
        match self {
            KernelSignal::Value(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, KernelSignal::Value(_))
    }
}

pub const MIN_N_ROLLING: usize = 7;
pub const MIN_N_QUARTILE: usize = 30;

/// Arithmetic mean. No minimum-sample guard of its own — callers apply the
/// guard appropriate to what they're computing.
pub fn mean(values: &[f64]) -> KernelSignal<f64> {
    if values.is_empty() {
        return KernelSignal::InsufficientData;
    }
    KernelSignal::Value(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by N, not N-1).
pub fn stddev(values: &[f64]) -> KernelSignal<f64> {
    let m = match mean(values) {
        KernelSignal::Value(m) => m,
        other => return other,
    };
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    KernelSignal::Value(variance.sqrt())
}

/// Linear-interpolation quartile (the same method as Excel's `PERCENTILE.INC`
/// / numpy's default `linear` interpolation).
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let n = sorted.len();
    if n == 1 {
        return sorted[0];
    }
    let pos = q * (n - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    if lower == upper {
        sorted[lower]
    } else {
        let frac = pos - lower as f64;
        sorted[lower] + (sorted[upper] - sorted[lower]) * frac
    }
}

/// Q1, Q3 via linear interpolation on sorted values. Requires `MIN_N_QUARTILE`
/// valid points (spec.md §4.1).
pub fn quartiles(values: &[f64]) -> KernelSignal<(f64, f64)> {
    if values.len() < MIN_N_QUARTILE {
        return KernelSignal::InsufficientData;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    KernelSignal::Value((quantile(&sorted, 0.25), quantile(&sorted, 0.75)))
}

/// IQR = Q3 - Q1.
pub fn iqr(values: &[f64]) -> KernelSignal<f64> {
    match quartiles(values) {
        KernelSignal::Value((q1, q3)) => KernelSignal::Value(q3 - q1),
        KernelSignal::InsufficientData => KernelSignal::InsufficientData,
        KernelSignal::Undefined => KernelSignal::Undefined,
    }
}

/// (x - mean) / stddev against a baseline sample. Undefined when stddev is 0.
pub fn z_score(x: f64, baseline: &[f64]) -> KernelSignal<f64> {
    let m = match mean(baseline) {
        KernelSignal::Value(m) => m,
        KernelSignal::InsufficientData => return KernelSignal::InsufficientData,
        KernelSignal::Undefined => return KernelSignal::Undefined,
    };
    let sd = match stddev(baseline) {
        KernelSignal::Value(sd) => sd,
        KernelSignal::InsufficientData => return KernelSignal::InsufficientData,
        KernelSignal::Undefined => return KernelSignal::Undefined,
    };
    if sd <= 0.0 {
        return KernelSignal::Undefined;
    }
    KernelSignal::Value((x - m) / sd)
}

/// Trailing mean over a window of calendar days ending (and including)
/// `anchor`, skipping gaps rather than imputing them. Requires `MIN_N_ROLLING`
/// valid points within the window by default.
pub fn rolling_mean(series: &[(NaiveDate, f64)], anchor: NaiveDate, window_days: i64, min_n: usize) -> KernelSignal<f64> {
    let floor = anchor - chrono::Duration::days(window_days - 1);
    let values: Vec<f64> = series
        .iter()
        .filter(|(d, _)| *d >= floor && *d <= anchor)
        .map(|(_, v)| *v)
        .collect();
    if values.len() < min_n {
        return KernelSignal::InsufficientData;
    }
    mean(&values)
}

/// Mean over the trailing window ending the day *before* `anchor` — used by
/// detectors that need a baseline that excludes the day being evaluated.
pub fn prior_mean(series: &[(NaiveDate, f64)], anchor: NaiveDate, window_days: i64, min_n: usize) -> KernelSignal<f64> {
    rolling_mean(series, anchor - chrono::Duration::days(1), window_days, min_n)
}

/// Values for the trailing window ending the day before `anchor`, for callers
/// (e.g. z-score) that need the raw baseline sample rather than its mean.
pub fn prior_window_values(series: &[(NaiveDate, f64)], anchor: NaiveDate, window_days: i64) -> Vec<f64> {
    let end = anchor - chrono::Duration::days(1);
    let floor = end - chrono::Duration::days(window_days - 1);
    series.iter().filter(|(d, _)| *d >= floor && *d <= end).map(|(_, v)| *v).collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Extremum {
    pub value: f64,
    pub date: NaiveDate,
}

/// Historical max over `[anchor - window_days + 1 - margin_days, anchor - margin_days]`,
/// with the date it occurred on. `margin_days` lets callers exclude a settling
/// buffer right before the anchor (spec.md §4.4's "2 days before yesterday").
pub fn historical_max(series: &[(NaiveDate, f64)], anchor: NaiveDate, window_days: i64, margin_days: i64, min_n: usize) -> KernelSignal<Extremum> {
    extremum(series, anchor, window_days, margin_days, min_n, true)
}

pub fn historical_min(series: &[(NaiveDate, f64)], anchor: NaiveDate, window_days: i64, margin_days: i64, min_n: usize) -> KernelSignal<Extremum> {
    extremum(series, anchor, window_days, margin_days, min_n, false)
}

fn extremum(series: &[(NaiveDate, f64)], anchor: NaiveDate, window_days: i64, margin_days: i64, min_n: usize, want_max: bool) -> KernelSignal<Extremum> {
    let end = anchor - chrono::Duration::days(margin_days);
    let start = end - chrono::Duration::days(window_days - 1);
    let in_window: Vec<(NaiveDate, f64)> = series.iter().filter(|(d, _)| *d >= start && *d <= end).cloned().collect();
    if in_window.len() < min_n {
        return KernelSignal::InsufficientData;
    }
    let best = in_window.into_iter().reduce(|a, b| {
        let a_wins = if want_max { a.1 >= b.1 } else { a.1 <= b.1 };
        if a_wins { a } else { b }
    });
    match best {
        Some((date, value)) => KernelSignal::Value(Extremum { value, date }),
        None => KernelSignal::InsufficientData,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn mean_and_stddev_are_order_invariant() {
        let a = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mut b = a;
        b.reverse();
        assert_eq!(mean(&a), mean(&b));
        assert_eq!(stddev(&a), stddev(&b));
    }

    #[test]
    fn zscore_undefined_on_zero_variance() {
        let baseline = vec![5.0; 10];
        assert_eq!(z_score(5.0, &baseline), KernelSignal::Undefined);
    }

    #[test]
    fn quartiles_need_min_sample() {
        let few: Vec<f64> = (0..29).map(|i| i as f64).collect();
        assert_eq!(quartiles(&few), KernelSignal::InsufficientData);
        let enough: Vec<f64> = (0..30).map(|i| i as f64).collect();
        assert!(quartiles(&enough).is_signal());
    }

    #[test]
    fn rolling_mean_skips_gaps_not_impute() {
        let series = vec![(d(2026, 1, 1), 10.0), (d(2026, 1, 3), 30.0), (d(2026, 1, 5), 50.0), (d(2026, 1, 6), 60.0), (d(2026, 1, 7), 70.0), (d(2026, 1, 8), 80.0), (d(2026, 1, 9), 90.0)];
        // 7-day window ending day 9: days 3..9 present except day 2 and 4 (gaps)
        let result = rolling_mean(&series, d(2026, 1, 9), 7, 6);
        assert_eq!(result, mean(&[30.0, 50.0, 60.0, 70.0, 80.0, 90.0]));
    }

    #[test]
    fn historical_max_finds_date_of_occurrence() {
        let series: Vec<(NaiveDate, f64)> = (1..=10).map(|day| (d(2026, 1, day), if day == 4 { 999.0 } else { 10.0 })).collect();
        let result = historical_max(&series, d(2026, 1, 10), 9, 1, 3);
        assert_eq!(result, KernelSignal::Value(Extremum { value: 999.0, date: d(2026, 1, 4) }));
    }
}
