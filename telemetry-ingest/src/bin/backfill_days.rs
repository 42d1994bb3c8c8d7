use std::{env, fs, process::ExitCode};

use anyhow::{bail, Context, Result};
use telemetry_ingest::{bootstrap, config::parse_day};
use time::Date;

const USAGE: &str = "usage: backfill_days <YYYY-MM-DD>... | backfill_days --file <dates.txt>";

/// Dates from the command line, or one per line from `--file`. Blank lines
/// and `#` comments are skipped; duplicates keep their first position.
fn requested_days(args: &[String]) -> Result<Vec<Date>> {
    let lines: Vec<String> = match args {
        [] => bail!(USAGE),
        [flag, path] if flag == "--file" => fs::read_to_string(path)
            .with_context(|| format!("failed to read {path}"))?
            .lines()
            .map(str::to_string)
            .collect(),
        [flag, ..] if flag == "--file" => bail!(USAGE),
        dates => dates.to_vec(),
    };

    let mut days = Vec::new();
    for line in &lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some(day) = parse_day(line) else {
            bail!("not a YYYY-MM-DD date: {line:?}");
        };
        if !days.contains(&day) {
            days.push(day);
        }
    }

    if days.is_empty() {
        bail!("no dates to backfill");
    }
    Ok(days)
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = env::args().skip(1).collect();

    let cfg = match bootstrap::init() {
        Ok(cfg) => cfg,
        Err(code) => return code,
    };

    let days = match requested_days(&args) {
        Ok(days) => days,
        Err(e) => {
            tracing::error!(error = %e, "invalid arguments");
            return ExitCode::from(1);
        }
    };
    tracing::info!(days = days.len(), "backfilling requested days");

    let pipeline = match bootstrap::connect(&cfg).await {
        Ok(p) => p,
        Err(e) => {
            tracing::error!(error = ?e, "startup failed");
            return ExitCode::from(1);
        }
    };

    let report = pipeline.run_days(&days).await;
    bootstrap::exit_code(&report)
}
