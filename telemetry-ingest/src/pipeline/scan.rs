use std::time::Duration;

use serde::Deserialize;
use time::{Date, PrimitiveDateTime};

/// What the driver does after a day ends in failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Record the failure and move on to the next day.
    Continue,
    /// Stop the run at the first failed day.
    Abort,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanSettings {
    pub default_start: Date,
    /// How far before the latest stored day the scan restarts.
    pub resume_margin: time::Duration,
    pub pause_min: Duration,
    pub pause_max: Duration,
    pub on_day_failure: FailurePolicy,
}

/// First day to process given the newest stored reading.
pub fn resume_date(latest: Option<PrimitiveDateTime>, settings: &ScanSettings) -> Date {
    match latest {
        Some(ts) => ts
            .date()
            .checked_sub(settings.resume_margin)
            .unwrap_or(Date::MIN),
        None => settings.default_start,
    }
}

/// Inclusive calendar-day range.
#[derive(Debug, Clone)]
pub struct DayRange {
    next: Option<Date>,
    last: Date,
}

impl DayRange {
    pub fn new(first: Date, last: Date) -> Self {
        Self {
            next: Some(first),
            last,
        }
    }
}

impl Iterator for DayRange {
    type Item = Date;

    fn next(&mut self) -> Option<Date> {
        let current = self.next.filter(|d| *d <= self.last)?;
        self.next = current.next_day();
        Some(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    fn settings() -> ScanSettings {
        ScanSettings {
            default_start: date!(2025-12-01),
            resume_margin: time::Duration::days(1),
            pause_min: Duration::from_secs(2),
            pause_max: Duration::from_secs(5),
            on_day_failure: FailurePolicy::Continue,
        }
    }

    #[test]
    fn resumes_one_day_before_latest_reading() {
        let latest = Some(datetime!(2026-01-10 23:45:00));
        assert_eq!(resume_date(latest, &settings()), date!(2026-01-09));

        let latest = Some(datetime!(2026-03-01 00:00:00));
        assert_eq!(resume_date(latest, &settings()), date!(2026-02-28));
    }

    #[test]
    fn empty_storage_starts_at_default_epoch() {
        assert_eq!(resume_date(None, &settings()), date!(2025-12-01));
    }

    #[test]
    fn day_range_is_inclusive_and_crosses_month_ends() {
        let days: Vec<_> = DayRange::new(date!(2025-12-30), date!(2026-01-02)).collect();
        assert_eq!(
            days,
            vec![date!(2025-12-30), date!(2025-12-31), date!(2026-01-01), date!(2026-01-02)]
        );
        assert_eq!(DayRange::new(date!(2026-01-02), date!(2026-01-02)).count(), 1);
        assert_eq!(DayRange::new(date!(2026-01-03), date!(2026-01-02)).count(), 0);
    }
}
