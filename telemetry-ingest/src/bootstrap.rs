use std::{process::ExitCode, sync::Arc};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    config::AppConfig,
    metrics_server, observability,
    pacing::{Pause, TokioPause},
    pipeline::{Pipeline, RunReport},
    sinks::PgTelemetrySink,
    sources::{ProviderSource, Session},
};

pub type ScraperPipeline = Pipeline<ProviderSource, PgTelemetrySink>;

/// Configuration, logging and metrics. Config errors are still logged to stdout.
pub fn init() -> Result<AppConfig, ExitCode> {
    let cfg = match AppConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            let _ = observability::init_tracing(None);
            tracing::error!(error = %e, "invalid configuration");
            return Err(ExitCode::from(1));
        }
    };

    if let Err(e) = observability::init_tracing(cfg.logging.file.as_deref()) {
        eprintln!("failed to initialise logging: {e}");
        return Err(ExitCode::from(1));
    }

    if let Some(metrics_cfg) = &cfg.metrics {
        if let Err(e) = metrics_server::init(&metrics_cfg.bind_addr) {
            tracing::error!(error = %e, "metrics endpoint disabled");
        }
    }

    Ok(cfg)
}

/// Log in to the provider and connect to the database.
pub async fn connect(cfg: &AppConfig) -> anyhow::Result<ScraperPipeline> {
    let identity = cfg.provider.identity()?;
    let policy = cfg.fetch.retry_policy()?;
    let settings = cfg.scan.settings()?;

    let session = Session::authenticate(&cfg.provider, &identity).await?;

    let pool = PgPoolOptions::new()
        .max_connections(cfg.database.max_connections)
        .connect_with(cfg.database.connect_options()?)
        .await
        .context("failed to connect to the database")?;
    tracing::info!(table = %cfg.database.table, "database connected");

    let pause: Arc<dyn Pause> = Arc::new(TokioPause);
    let source = ProviderSource::new(session, &cfg.provider, &identity, policy, pause.clone());
    let sink = PgTelemetrySink::from_config(pool, &cfg.database)?;

    Ok(Pipeline {
        source,
        sink,
        pause,
        settings,
    })
}

pub fn exit_code(report: &RunReport) -> ExitCode {
    report.log_summary();
    if report.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(2)
    }
}
