pub mod duckdb;
pub mod log_sink;

pub use self::duckdb::DuckDBConnector;
pub use log_sink::TracingAlertSink;
