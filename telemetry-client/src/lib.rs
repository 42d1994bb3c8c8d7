//! Storage-side types and queries for the meter telemetry table.

pub mod db;
pub mod domain;
