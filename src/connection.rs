use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;

use crate::{ConnectionConfig, QueryResult};

/// Boxed future returned by unit-of-work closures.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Factory for the connections a unit of work runs against.
///
/// Each call to [`Connector::connect`] makes a single attempt and yields a
/// connection with an open transaction.
#[async_trait]
pub trait Connector: Send + Sync {
    type Connection: Connection;

    async fn connect(&self, config: &ConnectionConfig) -> Result<Self::Connection, sqlx::Error>;
}

/// A connection owned exclusively by one unit of work.
///
/// `close` consumes the connection; no operation can follow it.
#[async_trait]
pub trait Connection: Send {
    /// Execute `query` verbatim and collect every row.
    async fn fetch_all(&mut self, query: &str) -> Result<QueryResult, sqlx::Error>;

    async fn commit(&mut self) -> Result<(), sqlx::Error>;

    async fn rollback(&mut self) -> Result<(), sqlx::Error>;

    /// Release the underlying connection.
    async fn close(self) -> Result<(), sqlx::Error>
    where
        Self: Sized;
}
