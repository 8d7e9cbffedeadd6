use std::error::Error as StdError;
use std::panic::Location;

use crate::unit_of_work::Phase;

/// Boxed cause returned by a unit-of-work closure.
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Error type for unit-of-work operations.
///
/// Each variant names the phase that failed; the connection has already
/// been released by the time any of them reaches the caller.
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
    #[error("Connection to {target} failed: {source}")]
    Connection {
        target: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Query failed: {source}")]
    Query {
        query: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("Transaction commit failed: {0}")]
    Commit(#[source] sqlx::Error),

    #[error("Transaction rolled back (unit of work started at {location}): {source}")]
    Transaction {
        location: &'static Location<'static>,
        #[source]
        source: BoxError,
    },
}

impl UnitOfWorkError {
    /// The phase the unit of work was in when it failed.
    pub fn phase(&self) -> Phase {
        match self {
            Self::Connection { .. } => Phase::Connecting,
            Self::Query { .. } => Phase::Connected,
            Self::Commit(_) => Phase::Committing,
            Self::Transaction { .. } => Phase::RollingBack,
        }
    }

    /// Downcast the original cause of a rolled-back transaction.
    pub fn cause_as<E: StdError + 'static>(&self) -> Option<&E> {
        match self {
            Self::Transaction { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

/// Result type for unit-of-work operations
pub type UnitOfWorkResult<T> = Result<T, UnitOfWorkError>;

/// A row whose value count differs from the result's column count.
#[derive(Debug, thiserror::Error)]
#[error("Row {row} has {actual} values but the result has {expected} columns")]
pub struct RowWidthError {
    pub row: usize,
    pub expected: usize,
    pub actual: usize,
}

/// Errors raised while loading connection settings.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing configuration key: {0}")]
    Missing(&'static str),

    #[error("Invalid port: {0:?}")]
    InvalidPort(String),
}
