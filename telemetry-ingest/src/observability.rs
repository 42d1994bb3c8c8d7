use std::{fs::OpenOptions, sync::Mutex};

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install the global subscriber: stdout always, plus an append-only log file
/// when `log_file` is set. `RUST_LOG` overrides the default filter.
///
/// A log file that cannot be opened is reported on stdout and skipped.
pub fn init_tracing(log_file: Option<&str>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("telemetry_ingest=info,warn"));

    let mut open_error = None;
    let file_layer = log_file.and_then(|path| {
        match OpenOptions::new().create(true).append(true).open(path) {
            Ok(file) => Some(fmt::layer().with_ansi(false).with_target(false).with_writer(Mutex::new(file))),
            Err(e) => {
                open_error = Some((path.to_string(), e));
                None
            }
        }
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false))
        .with(file_layer)
        .try_init()?;

    if let Some((path, error)) = open_error {
        tracing::warn!(%path, %error, "log file unavailable, logging to stdout only");
    }
    Ok(())
}
