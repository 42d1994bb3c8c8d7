pub mod bootstrap;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pacing;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;

pub use pipeline::{DayOutcome, Pipeline, PipelineError, RunReport};
