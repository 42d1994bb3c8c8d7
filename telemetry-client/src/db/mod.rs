mod identifier;
pub mod telemetry_queries;

pub use identifier::{IdentifierError, SqlIdent};
