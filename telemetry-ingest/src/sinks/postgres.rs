use std::time::Duration;

use sqlx::postgres::PgPool;
use telemetry_client::{
    db::{telemetry_queries, SqlIdent},
    domain::TelemetryRecord,
};
use time::{Date, PrimitiveDateTime};

use crate::{
    config::DatabaseConfig,
    pipeline::{PipelineError, TelemetrySink},
};

/// Telemetry table plus the cleaning procedure that runs after each day.
pub struct PgTelemetrySink {
    pool: PgPool,
    table: SqlIdent,
    insert_sql: String,
    procedure: SqlIdent,
    max_retries: u32,
    retry_backoff: Duration,
}

impl PgTelemetrySink {
    pub fn new(pool: PgPool, table: SqlIdent, procedure: SqlIdent, max_retries: u32, retry_backoff: Duration) -> Self {
        let insert_sql = telemetry_queries::insert_if_absent_sql(&table);
        Self {
            pool,
            table,
            insert_sql,
            procedure,
            max_retries,
            retry_backoff,
        }
    }

    pub fn from_config(pool: PgPool, cfg: &DatabaseConfig) -> anyhow::Result<Self> {
        Ok(Self::new(
            pool,
            cfg.table()?,
            cfg.transform_procedure()?,
            cfg.max_retries,
            cfg.retry_backoff(),
        ))
    }

    /// All rows of one day in a single transaction; nothing is kept on error.
    async fn insert_day(&self, records: &[TelemetryRecord]) -> anyhow::Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0;
        for record in records {
            inserted += telemetry_queries::insert_if_absent(&mut *tx, &self.insert_sql, record).await?;
        }
        tx.commit().await?;
        Ok(inserted)
    }
}

fn day_bounds(date: Date) -> (PrimitiveDateTime, PrimitiveDateTime) {
    let end = date.next_day().unwrap_or(date);
    (date.midnight(), end.midnight())
}

#[async_trait::async_trait]
impl TelemetrySink for PgTelemetrySink {
    async fn latest_timestamp(&self) -> Result<Option<PrimitiveDateTime>, PipelineError> {
        telemetry_queries::latest_timestamp(&self.pool, &self.table)
            .await
            .map_err(|e| PipelineError::Sink(format!("reading latest timestamp from {}: {e}", self.table)))
    }

    async fn upsert_day(&self, records: &[TelemetryRecord], date: Date) -> Result<u64, PipelineError> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut attempt: u32 = 0;
        loop {
            match self.insert_day(records).await {
                Ok(inserted) => {
                    metrics::counter!("telemetry_inserted_records_total").increment(inserted);
                    tracing::info!(
                        %date,
                        inserted,
                        skipped = records.len() as u64 - inserted,
                        table = %self.table,
                        "day stored"
                    );
                    return Ok(inserted);
                }
                Err(e) if attempt < self.max_retries => {
                    attempt += 1;
                    let sleep_for = self.retry_backoff * attempt;
                    tracing::warn!(error = %e, %date, attempt, "telemetry insert failed, retrying with backoff");
                    tokio::time::sleep(sleep_for).await;
                }
                Err(e) => {
                    tracing::error!(error = %e, %date, "telemetry insert failed, giving up");
                    metrics::counter!("telemetry_sink_errors_total").increment(1);
                    return Err(PipelineError::Sink(e.to_string()));
                }
            }
        }
    }

    async fn run_transform(&self, date: Date) -> Result<(), PipelineError> {
        let (from, to) = day_bounds(date);
        tracing::info!(procedure = %self.procedure, %from, %to, "running day transform");

        telemetry_queries::run_transform(&self.pool, &self.procedure, from, to)
            .await
            .map_err(|e| {
                metrics::counter!("transform_failures_total").increment(1);
                PipelineError::Sink(format!("{}: {e}", self.procedure))
            })?;

        tracing::info!(%date, "day transform finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};

    #[test]
    fn transform_covers_the_whole_calendar_day() {
        assert_eq!(
            day_bounds(date!(2025-12-31)),
            (datetime!(2025-12-31 00:00:00), datetime!(2026-01-01 00:00:00))
        );
    }
}
