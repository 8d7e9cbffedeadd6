pub mod observers;

pub use observers::RecordingObserver;

use query_unit_of_work::ConnectionConfig;

/// Error raised by test closures to simulate a failing unit of work.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct ValueError(pub String);

pub fn test_config() -> ConnectionConfig {
    ConnectionConfig::new("localhost", "app", "secret", "app_db", 5432)
}
