mod scan;

use std::{sync::Arc, time::Instant};

use telemetry_client::domain::TelemetryRecord;
use time::{Date, PrimitiveDateTime};

use crate::{
    pacing::{jitter, Pause},
    transform::{self, RawRecord},
};

pub use scan::{resume_date, DayRange, FailurePolicy, ScanSettings};

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error("fetch failed after {attempts} attempts: {reason}")]
    FetchExhausted { attempts: u32, reason: String },
    #[error("sink error: {0}")]
    Sink(String),
}

/// Provider side: one calendar day of raw readings.
///
/// `Ok(vec![])` means the provider has nothing for that day; giving up after
/// retries is `Err(PipelineError::FetchExhausted)`.
#[async_trait::async_trait]
pub trait TelemetrySource: Send + Sync {
    async fn fetch_day(&self, date: Date) -> Result<Vec<RawRecord>, PipelineError>;
}

/// Storage side: resume point, conditional insert and the day transform.
#[async_trait::async_trait]
pub trait TelemetrySink: Send + Sync {
    async fn latest_timestamp(&self) -> Result<Option<PrimitiveDateTime>, PipelineError>;

    /// Insert records whose timestamp is not stored yet, atomically for the day.
    /// Returns the number of rows written.
    async fn upsert_day(&self, records: &[TelemetryRecord], date: Date) -> Result<u64, PipelineError>;

    async fn run_transform(&self, date: Date) -> Result<(), PipelineError>;
}

/// How one day went.
#[derive(Debug, Clone, PartialEq)]
pub enum DayOutcome {
    /// The provider returned no readings.
    NoData,
    FetchFailed { reason: String },
    Processed {
        fetched: usize,
        normalized: usize,
        persist: Result<u64, String>,
        transform: Result<(), String>,
    },
}

impl DayOutcome {
    pub fn is_failure(&self) -> bool {
        match self {
            Self::NoData => false,
            Self::FetchFailed { .. } => true,
            Self::Processed {
                persist, transform, ..
            } => persist.is_err() || transform.is_err(),
        }
    }
}

#[derive(Debug, Default)]
pub struct RunReport {
    pub days: Vec<(Date, DayOutcome)>,
    /// Set when the failure policy stopped the run early.
    pub aborted: bool,
}

impl RunReport {
    pub fn inserted(&self) -> u64 {
        self.days
            .iter()
            .filter_map(|(_, o)| match o {
                DayOutcome::Processed { persist: Ok(n), .. } => Some(*n),
                _ => None,
            })
            .sum()
    }

    pub fn failed_days(&self) -> Vec<Date> {
        self.days
            .iter()
            .filter(|(_, o)| o.is_failure())
            .map(|(d, _)| *d)
            .collect()
    }

    pub fn is_success(&self) -> bool {
        !self.aborted && self.failed_days().is_empty()
    }

    pub fn log_summary(&self) {
        let failed = self.failed_days();
        let no_data = self
            .days
            .iter()
            .filter(|(_, o)| *o == DayOutcome::NoData)
            .count();

        if failed.is_empty() && !self.aborted {
            tracing::info!(
                days = self.days.len(),
                no_data,
                inserted = self.inserted(),
                "run finished"
            );
        } else {
            let failed: Vec<String> = failed.iter().map(Date::to_string).collect();
            tracing::error!(
                days = self.days.len(),
                no_data,
                inserted = self.inserted(),
                aborted = self.aborted,
                failed_days = %failed.join(","),
                "run finished with failures"
            );
        }
    }
}

/// Day-by-day driver: fetch, normalize, persist, transform.
pub struct Pipeline<S, K> {
    pub source: S,
    pub sink: K,
    pub pause: Arc<dyn Pause>,
    pub settings: ScanSettings,
}

impl<S, K> Pipeline<S, K>
where
    S: TelemetrySource,
    K: TelemetrySink,
{
    /// First day of this run, from the newest stored reading.
    pub async fn resume_point(&self) -> Result<Date, PipelineError> {
        let latest = self.sink.latest_timestamp().await?;
        let start = resume_date(latest, &self.settings);

        match latest {
            Some(ts) => tracing::info!(latest = %ts, resume = %start, "resuming scan before latest stored reading"),
            None => tracing::info!(resume = %start, "no stored readings, scanning from default start"),
        }
        Ok(start)
    }

    /// Scan from the resume point through `today`, inclusive.
    ///
    /// `today` is fixed for the whole run.
    pub async fn run_scan(&self, today: Date) -> Result<RunReport, PipelineError> {
        let start = self.resume_point().await?;
        let days: Vec<Date> = DayRange::new(start, today).collect();
        if days.is_empty() {
            tracing::info!(%start, %today, "nothing to scan");
        }
        Ok(self.run_days(&days).await)
    }

    /// Process `days` in order, pausing a random interval between them.
    pub async fn run_days(&self, days: &[Date]) -> RunReport {
        let mut report = RunReport::default();

        for (i, &date) in days.iter().enumerate() {
            let outcome = self.run_day(date).await;
            let failed = outcome.is_failure();
            report.days.push((date, outcome));

            if failed && self.settings.on_day_failure == FailurePolicy::Abort {
                tracing::error!(%date, "stopping run after failed day");
                report.aborted = true;
                break;
            }

            if i + 1 < days.len() {
                let wait = jitter(self.settings.pause_min, self.settings.pause_max);
                tracing::info!(wait_secs = wait.as_secs_f64(), "pausing before next day");
                self.pause.pause(wait).await;
            }
        }

        report
    }

    pub async fn run_day(&self, date: Date) -> DayOutcome {
        tracing::info!(%date, "processing day");
        let started = Instant::now();

        let raw = match self.source.fetch_day(date).await {
            Ok(raw) => raw,
            Err(e) => {
                tracing::error!(%date, error = %e, "giving up on day");
                return DayOutcome::FetchFailed { reason: e.to_string() };
            }
        };

        if raw.is_empty() {
            tracing::warn!(%date, "no readings for day");
            return DayOutcome::NoData;
        }

        let records = transform::normalize(&raw);

        let persist = self.sink.upsert_day(&records, date).await.map_err(|e| {
            tracing::error!(%date, error = %e, "storing day failed");
            e.to_string()
        });

        let transform = self.sink.run_transform(date).await.map_err(|e| {
            tracing::error!(%date, error = %e, "day transform failed");
            e.to_string()
        });

        metrics::histogram!("day_processing_seconds").record(started.elapsed().as_secs_f64());

        DayOutcome::Processed {
            fetched: raw.len(),
            normalized: records.len(),
            persist,
            transform,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{BTreeMap, HashMap},
        sync::Mutex,
        time::Duration,
    };

    use super::*;
    use crate::pacing::testing::RecordingPause;
    use serde_json::json;
    use time::macros::{date, datetime};

    #[derive(Default)]
    struct FakeSource {
        days: HashMap<Date, Result<Vec<RawRecord>, String>>,
        requested: Mutex<Vec<Date>>,
    }

    impl FakeSource {
        fn with_day(mut self, date: Date, items: Vec<serde_json::Value>) -> Self {
            let raw = items
                .into_iter()
                .map(|v| match v {
                    serde_json::Value::Object(map) => RawRecord(map),
                    other => panic!("fixture must be an object, got {other}"),
                })
                .collect();
            self.days.insert(date, Ok(raw));
            self
        }

        fn failing_day(mut self, date: Date) -> Self {
            self.days.insert(date, Err("HTTP 500".to_string()));
            self
        }

        fn requested(&self) -> Vec<Date> {
            self.requested.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl TelemetrySource for FakeSource {
        async fn fetch_day(&self, date: Date) -> Result<Vec<RawRecord>, PipelineError> {
            self.requested.lock().unwrap().push(date);
            match self.days.get(&date) {
                Some(Ok(raw)) => Ok(raw.clone()),
                Some(Err(reason)) => Err(PipelineError::FetchExhausted {
                    attempts: 5,
                    reason: reason.clone(),
                }),
                None => Ok(Vec::new()),
            }
        }
    }

    /// Table keyed by timestamp with the same insert-if-absent contract as Postgres.
    #[derive(Default)]
    struct MemorySink {
        rows: Mutex<BTreeMap<PrimitiveDateTime, TelemetryRecord>>,
        transformed: Mutex<Vec<Date>>,
        fail_upsert_on: Option<Date>,
    }

    impl MemorySink {
        fn seeded(stamps: &[PrimitiveDateTime]) -> Self {
            let sink = Self::default();
            {
                let mut rows = sink.rows.lock().unwrap();
                for ts in stamps {
                    rows.insert(*ts, TelemetryRecord::empty(*ts));
                }
            }
            sink
        }

        fn stored(&self) -> Vec<PrimitiveDateTime> {
            self.rows.lock().unwrap().keys().copied().collect()
        }

        fn transformed(&self) -> Vec<Date> {
            self.transformed.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl TelemetrySink for MemorySink {
        async fn latest_timestamp(&self) -> Result<Option<PrimitiveDateTime>, PipelineError> {
            Ok(self.rows.lock().unwrap().keys().next_back().copied())
        }

        async fn upsert_day(&self, records: &[TelemetryRecord], date: Date) -> Result<u64, PipelineError> {
            if self.fail_upsert_on == Some(date) {
                return Err(PipelineError::Sink("connection reset".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            let mut inserted = 0;
            for r in records {
                if !rows.contains_key(&r.timestamp) {
                    rows.insert(r.timestamp, r.clone());
                    inserted += 1;
                }
            }
            Ok(inserted)
        }

        async fn run_transform(&self, date: Date) -> Result<(), PipelineError> {
            self.transformed.lock().unwrap().push(date);
            Ok(())
        }
    }

    fn pipeline(
        source: FakeSource,
        sink: MemorySink,
        pause: Arc<RecordingPause>,
    ) -> Pipeline<FakeSource, MemorySink> {
        Pipeline {
            source,
            sink,
            pause,
            settings: ScanSettings {
                default_start: date!(2025-12-01),
                resume_margin: time::Duration::days(1),
                pause_min: Duration::from_secs(2),
                pause_max: Duration::from_secs(5),
                on_day_failure: FailurePolicy::Continue,
            },
        }
    }

    fn reading(ts: &str) -> serde_json::Value {
        json!({ "ngaygio": ts, "importkwh": "10.005" })
    }

    #[tokio::test]
    async fn resumes_one_day_before_latest_stored_date() {
        let sink = MemorySink::seeded(&[datetime!(2026-01-09 12:00:00), datetime!(2026-01-10 08:00:00)]);
        let pause = Arc::new(RecordingPause::default());
        let p = pipeline(FakeSource::default(), sink, pause.clone());

        let report = p.run_scan(date!(2026-01-11)).await.unwrap();

        assert_eq!(p.source.requested(), vec![date!(2026-01-09), date!(2026-01-10), date!(2026-01-11)]);
        assert_eq!(report.days.len(), 3);
        assert!(report.is_success());
    }

    #[tokio::test]
    async fn empty_storage_scans_from_default_epoch_with_pauses_between_days() {
        let pause = Arc::new(RecordingPause::default());
        let p = pipeline(FakeSource::default(), MemorySink::default(), pause.clone());

        p.run_scan(date!(2025-12-04)).await.unwrap();

        assert_eq!(p.source.requested().first(), Some(&date!(2025-12-01)));
        assert_eq!(p.source.requested().len(), 4);

        let pauses = pause.calls();
        assert_eq!(pauses.len(), 3);
        assert!(pauses
            .iter()
            .all(|d| *d >= Duration::from_secs(2) && *d < Duration::from_secs(5)));
    }

    #[tokio::test]
    async fn empty_day_skips_persist_and_transform() {
        let pause = Arc::new(RecordingPause::default());
        let p = pipeline(FakeSource::default(), MemorySink::default(), pause);

        let outcome = p.run_day(date!(2025-12-01)).await;

        assert_eq!(outcome, DayOutcome::NoData);
        assert!(!outcome.is_failure());
        assert!(p.sink.transformed().is_empty());
    }

    #[tokio::test]
    async fn rerunning_a_day_inserts_nothing_new() {
        let day = date!(2025-12-01);
        let source = FakeSource::default().with_day(
            day,
            vec![
                reading("2025-12-01T00:00:00"),
                reading("2025-12-01T00:30:00"),
                reading("not a time"),
            ],
        );
        let pause = Arc::new(RecordingPause::default());
        let p = pipeline(source, MemorySink::default(), pause);

        let first = p.run_day(day).await;
        let second = p.run_day(day).await;

        assert_eq!(
            first,
            DayOutcome::Processed {
                fetched: 3,
                normalized: 2,
                persist: Ok(2),
                transform: Ok(())
            }
        );
        assert!(matches!(second, DayOutcome::Processed { persist: Ok(0), .. }));
        assert_eq!(
            p.sink.stored(),
            vec![datetime!(2025-12-01 00:00:00), datetime!(2025-12-01 00:30:00)]
        );
        assert_eq!(p.sink.transformed(), vec![day, day]);
    }

    #[tokio::test]
    async fn storage_failure_is_reported_and_the_run_continues() {
        let source = FakeSource::default()
            .with_day(date!(2025-12-01), vec![reading("2025-12-01T00:00:00")])
            .with_day(date!(2025-12-02), vec![reading("2025-12-02T00:00:00")]);
        let sink = MemorySink {
            fail_upsert_on: Some(date!(2025-12-01)),
            ..MemorySink::default()
        };
        let pause = Arc::new(RecordingPause::default());
        let p = pipeline(source, sink, pause);

        let report = p.run_days(&[date!(2025-12-01), date!(2025-12-02)]).await;

        assert_eq!(report.failed_days(), vec![date!(2025-12-01)]);
        assert_eq!(report.inserted(), 1);
        assert!(!report.is_success());
        // The transform still runs for the day whose insert failed.
        assert_eq!(p.sink.transformed(), vec![date!(2025-12-01), date!(2025-12-02)]);
    }

    #[tokio::test]
    async fn fetch_exhaustion_is_a_failed_day_not_an_empty_one() {
        let source = FakeSource::default().failing_day(date!(2025-12-01));
        let pause = Arc::new(RecordingPause::default());
        let p = pipeline(source, MemorySink::default(), pause);

        let outcome = p.run_day(date!(2025-12-01)).await;

        assert!(matches!(outcome, DayOutcome::FetchFailed { ref reason } if reason.contains("HTTP 500")));
        assert!(outcome.is_failure());
        assert!(p.sink.transformed().is_empty());
    }

    #[tokio::test]
    async fn abort_policy_stops_at_first_failed_day() {
        let source = FakeSource::default().failing_day(date!(2025-12-02));
        let pause = Arc::new(RecordingPause::default());
        let mut p = pipeline(source, MemorySink::default(), pause.clone());
        p.settings.on_day_failure = FailurePolicy::Abort;

        let report = p.run_scan(date!(2025-12-05)).await.unwrap();

        assert!(report.aborted);
        assert_eq!(p.source.requested(), vec![date!(2025-12-01), date!(2025-12-02)]);
        assert_eq!(pause.calls().len(), 1);
    }
}
