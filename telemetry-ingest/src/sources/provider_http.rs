use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::Date;

use super::{
    retry::{RetryAction, RetryPolicy},
    session::Session,
};
use crate::{
    config::{ProviderConfig, ProviderIdentity},
    pacing::Pause,
    pipeline::{PipelineError, TelemetrySource},
    transform::RawRecord,
};

#[derive(Serialize)]
struct DayQuery<'a> {
    #[serde(rename = "customerPoint")]
    customer_point: &'a str,
    #[serde(rename = "customerCode")]
    customer_code: &'a str,
    from: String,
    to: String,
    #[serde(rename = "SkipCount")]
    skip_count: u32,
    #[serde(rename = "MaxResultCount")]
    max_result_count: u32,
}

#[derive(Deserialize)]
struct DayResponse {
    #[serde(rename = "soLieu")]
    readings: Option<ReadingPage>,
}

#[derive(Deserialize)]
struct ReadingPage {
    items: Option<Vec<Value>>,
}

/// Pulls one day of readings for the configured metering point.
pub struct ProviderSource {
    session: Session,
    data_url: String,
    customer_code: String,
    customer_point: String,
    page_size: u32,
    policy: RetryPolicy,
    pause: Arc<dyn Pause>,
}

impl ProviderSource {
    pub fn new(
        session: Session,
        provider: &ProviderConfig,
        identity: &ProviderIdentity,
        policy: RetryPolicy,
        pause: Arc<dyn Pause>,
    ) -> Self {
        Self {
            session,
            data_url: provider.data_url.clone(),
            customer_code: identity.customer_code.clone(),
            customer_point: identity.customer_point.clone(),
            page_size: provider.page_size,
            policy,
            pause,
        }
    }

    /// One request. `Ok` carries the policy verdict and, on success, the items.
    async fn attempt(&self, query: &DayQuery<'_>) -> Result<(RetryAction, Vec<RawRecord>), String> {
        let resp = self
            .session
            .get(&self.data_url)
            .query(query)
            .send()
            .await
            .map_err(|e| format!("request failed: {e}"))?;

        let status = resp.status();
        let action = self.policy.classify(status);

        match action {
            RetryAction::Accept => {
                let body: DayResponse = resp.json().await.map_err(|e| format!("undecodable body: {e}"))?;
                Ok((action, into_records(body)))
            }
            RetryAction::Cooldown(_) if status == reqwest::StatusCode::BAD_REQUEST => {
                let body = resp.text().await.unwrap_or_default();
                tracing::error!(%status, %body, "provider rejected the data request");
                Ok((action, Vec::new()))
            }
            RetryAction::Cooldown(wait) => {
                tracing::warn!(%status, wait_secs = wait.as_secs_f64(), "provider rate limit hit");
                Ok((action, Vec::new()))
            }
            RetryAction::Backoff => Err(format!("unexpected status {status}")),
        }
    }
}

fn into_records(body: DayResponse) -> Vec<RawRecord> {
    let items = body.readings.and_then(|p| p.items).unwrap_or_default();
    let total = items.len();

    let records: Vec<RawRecord> = items
        .into_iter()
        .filter_map(|item| match item {
            Value::Object(map) => Some(RawRecord(map)),
            _ => None,
        })
        .collect();

    if records.len() < total {
        tracing::warn!(skipped = total - records.len(), "ignored non-object items in provider response");
    }
    records
}

#[async_trait::async_trait]
impl TelemetrySource for ProviderSource {
    async fn fetch_day(&self, date: Date) -> Result<Vec<RawRecord>, PipelineError> {
        let query = DayQuery {
            customer_point: &self.customer_point,
            customer_code: &self.customer_code,
            from: date.to_string(),
            to: date.to_string(),
            skip_count: 0,
            max_result_count: self.page_size,
        };

        let mut last_failure = String::new();
        for attempt in 1..=self.policy.max_attempts {
            tracing::info!(%date, attempt, "fetching provider readings");
            metrics::counter!("provider_fetch_attempts_total").increment(1);

            let action = match self.attempt(&query).await {
                Ok((RetryAction::Accept, records)) => {
                    tracing::info!(%date, rows = records.len(), "provider readings downloaded");
                    return Ok(records);
                }
                Ok((action, _)) => {
                    last_failure = match action {
                        RetryAction::Cooldown(d) => format!("cooldown status, waited {}s", d.as_secs()),
                        _ => "retryable status".to_string(),
                    };
                    action
                }
                Err(e) => {
                    tracing::error!(%date, attempt, error = %e, "provider fetch attempt failed");
                    last_failure = e;
                    RetryAction::Backoff
                }
            };

            if let Some(wait) = self.policy.delay_after(action, attempt) {
                self.pause.pause(wait).await;
            }
        }

        tracing::error!(%date, attempts = self.policy.max_attempts, "provider fetch retries exhausted");
        metrics::counter!("provider_fetch_exhausted_total").increment(1);
        Err(PipelineError::FetchExhausted {
            attempts: self.policy.max_attempts,
            reason: last_failure,
        })
    }
}
