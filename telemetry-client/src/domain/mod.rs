mod telemetry;

pub use telemetry::TelemetryRecord;
