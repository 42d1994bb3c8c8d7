use std::process::ExitCode;

use telemetry_ingest::bootstrap;
use time::OffsetDateTime;

#[tokio::main]
async fn main() -> ExitCode {
    let cfg = match bootstrap::init() {
        Ok(cfg) => cfg,
        Err(code) => return code,
    };

    let pipeline = match bootstrap::connect(&cfg).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = ?e, "startup failed");
            return ExitCode::from(1);
        }
    };

    // Fixed once; a run crossing midnight does not pick up the new day.
    let today = OffsetDateTime::now_local()
        .unwrap_or_else(|_| OffsetDateTime::now_utc())
        .date();

    match pipeline.run_scan(today).await {
        Ok(report) => bootstrap::exit_code(&report),
        Err(e) => {
            tracing::error!(error = %e, "could not determine resume point");
            ExitCode::from(1)
        }
    }
}
