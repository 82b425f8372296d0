use chrono::NaiveDate;

/// Single source of time for the run. Detectors never read the system clock
/// directly — see spec.md §9's redesign flag on implicit time semantics.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Reads the real wall clock, optionally pinned by `REFERENCE_DATE_OVERRIDE`.
pub struct SystemClock {
    override_date: Option<NaiveDate>,
}

impl SystemClock {
    pub fn new(override_date: Option<NaiveDate>) -> Self {
        Self { override_date }
    }
}

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        self.override_date.unwrap_or_else(|| chrono::Utc::now().date_naive())
    }
}

/// Fixed date for tests and deterministic dry runs.
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// The day the run is "for" — the latest calendar day whose warehouse export
/// is considered settled. spec.md §4.8 step 1.
pub fn analysis_date(reference_date: NaiveDate, settling_days: i64) -> NaiveDate {
    reference_date - chrono::Duration::days(settling_days)
}
