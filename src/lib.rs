//! Query Unit of Work
//!
//! This crate runs database work as a single unit: acquire one connection,
//! let the caller execute statements on it, commit on success or roll back on
//! failure, and release the connection on every exit path.

pub mod config;
pub mod connection;
pub mod drivers;
pub mod error;
pub mod executor;
pub mod result;
pub mod transaction_aware;
pub mod unit_of_work;

pub use config::{ConnectionConfig, QuerySettings};
pub use connection::{BoxFuture, Connection, Connector};
pub use error::{BoxError, ConfigError, RowWidthError, UnitOfWorkError, UnitOfWorkResult};
pub use executor::fetch_all;
pub use result::{QueryResult, SqlValue};
pub use transaction_aware::TransactionAware;
pub use unit_of_work::{Phase, UnitOfWork};
