pub mod postgres;

pub use postgres::PgTelemetrySink;
