use std::fmt;
use std::future::Future;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::Instrument;
use uuid::Uuid;

use crate::connection::BoxFuture;
use crate::error::BoxError;
use crate::{
    executor, Connection, ConnectionConfig, Connector, QueryResult, TransactionAware,
    UnitOfWorkError, UnitOfWorkResult,
};

/// Lifecycle of a single unit of work.
///
/// `Idle -> Connecting -> Connected -> (Committing | RollingBack) -> Closed`.
/// A failed connect goes straight to `Closed`. No phase is entered twice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Connecting,
    Connected,
    Committing,
    RollingBack,
    Closed,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Connecting => "connecting",
            Phase::Connected => "connected",
            Phase::Committing => "committing",
            Phase::RollingBack => "rolling_back",
            Phase::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Tracks the phase of a running unit of work.
///
/// If the enclosing future is dropped or unwinds before reaching `Closed`,
/// the connection is released by its own destructor and this guard records
/// where the unit of work was interrupted.
struct Lifecycle {
    phase: Phase,
}

impl Lifecycle {
    fn new() -> Self {
        Self { phase: Phase::Idle }
    }

    fn enter(&mut self, next: Phase) {
        debug_assert!(
            self.phase != Phase::Closed,
            "unit of work re-entered after close"
        );
        self.phase = next;
    }
}

impl Drop for Lifecycle {
    fn drop(&mut self) {
        if self.phase != Phase::Closed {
            tracing::warn!(
                phase = %self.phase,
                "unit of work abandoned before close; connection dropped"
            );
        }
    }
}

/// Unit of Work pattern for a single transactional connection.
///
/// Every call to [`UnitOfWork::run`] acquires its own connection from the
/// connector, hands it to the caller's closure, commits on success or rolls
/// back on failure, and always closes the connection before returning.
pub struct UnitOfWork<K: Connector> {
    connector: K,
    observers: RwLock<Vec<Arc<dyn TransactionAware>>>,
}

impl<K: Connector> UnitOfWork<K> {
    pub fn new(connector: K) -> Self {
        Self {
            connector,
            observers: RwLock::new(Vec::new()),
        }
    }

    pub fn connector(&self) -> &K {
        &self.connector
    }

    /// Register a component to be notified after each commit or rollback.
    pub fn register_transaction_aware(&self, observer: Arc<dyn TransactionAware>) {
        self.observers.write().push(observer);
    }

    /// Run `work` inside one unit of work.
    ///
    /// - connect fails: [`UnitOfWorkError::Connection`], nothing else runs.
    /// - `work` succeeds: the transaction is committed and the value
    ///   returned; a failed commit yields [`UnitOfWorkError::Commit`].
    /// - `work` fails: the transaction is rolled back and the cause is
    ///   returned wrapped in [`UnitOfWorkError::Transaction`] along with
    ///   the location of this call. A failed rollback is only logged.
    ///
    /// The connection is closed on every one of these paths.
    #[track_caller]
    pub fn run<'a, T, E, F>(
        &'a self,
        config: &'a ConnectionConfig,
        work: F,
    ) -> impl Future<Output = UnitOfWorkResult<T>> + Send + 'a
    where
        F: for<'c> FnOnce(&'c mut K::Connection) -> BoxFuture<'c, Result<T, E>> + Send + 'a,
        T: Send + 'a,
        E: Into<BoxError> + Send + 'a,
    {
        let location = Location::caller();
        let uow_id = Uuid::new_v4();
        let span = tracing::info_span!("unit_of_work", %uow_id, target = %config.target());

        async move {
            let mut lifecycle = Lifecycle::new();

            lifecycle.enter(Phase::Connecting);
            tracing::debug!(phase = %Phase::Connecting, "connecting");
            let mut connection = match self.connector.connect(config).await {
                Ok(connection) => connection,
                Err(source) => {
                    lifecycle.enter(Phase::Closed);
                    tracing::error!(phase = %Phase::Connecting, error = %source, "connect failed");
                    return Err(UnitOfWorkError::Connection {
                        target: config.target(),
                        source,
                    });
                }
            };

            lifecycle.enter(Phase::Connected);
            tracing::debug!(phase = %Phase::Connected, "connected");

            match work(&mut connection).await {
                Ok(value) => {
                    lifecycle.enter(Phase::Committing);
                    let committed = connection.commit().await;
                    match &committed {
                        Ok(()) => tracing::info!(phase = %Phase::Committing, "committed"),
                        Err(source) => {
                            tracing::error!(phase = %Phase::Committing, error = %source, "commit failed")
                        }
                    }
                    close(connection, &mut lifecycle).await;

                    match committed {
                        Ok(()) => {
                            self.notify(uow_id, true).await;
                            Ok(value)
                        }
                        Err(source) => Err(UnitOfWorkError::Commit(source)),
                    }
                }
                Err(cause) => {
                    let cause: BoxError = cause.into();
                    lifecycle.enter(Phase::RollingBack);
                    match connection.rollback().await {
                        Ok(()) => tracing::warn!(
                            phase = %Phase::RollingBack,
                            %location,
                            error = %cause,
                            "rolled back"
                        ),
                        Err(rollback_error) => tracing::warn!(
                            phase = %Phase::RollingBack,
                            %location,
                            error = %cause,
                            rollback_error = %rollback_error,
                            "rollback failed; transaction discarded on close"
                        ),
                    }
                    close(connection, &mut lifecycle).await;
                    self.notify(uow_id, false).await;

                    Err(UnitOfWorkError::Transaction {
                        location,
                        source: cause,
                    })
                }
            }
        }
        .instrument(span)
    }

    /// Run a single query in its own unit of work and return its rows.
    #[track_caller]
    pub fn run_query<'a>(
        &'a self,
        config: &'a ConnectionConfig,
        query: &str,
    ) -> impl Future<Output = UnitOfWorkResult<QueryResult>> + Send + 'a {
        let query = query.to_owned();
        self.run(config, move |connection| {
            Box::pin(async move { executor::fetch_all(connection, &query).await })
        })
    }

    async fn notify(&self, uow_id: Uuid, committed: bool) {
        let observers = self.observers.read().clone();
        for observer in observers.iter() {
            if committed {
                observer.on_commit(uow_id).await;
            } else {
                observer.on_rollback(uow_id).await;
            }
        }
    }
}

/// Close `connection`, logging rather than propagating a failure.
async fn close<C: Connection>(connection: C, lifecycle: &mut Lifecycle) {
    if let Err(error) = connection.close().await {
        tracing::warn!(phase = %Phase::Closed, error = %error, "close failed");
    }
    lifecycle.enter(Phase::Closed);
    tracing::debug!(phase = %Phase::Closed, "closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_names() {
        assert_eq!(Phase::RollingBack.to_string(), "rolling_back");
        assert_eq!(Phase::Closed.to_string(), "closed");
    }

    #[test]
    fn test_lifecycle_tracks_phases() {
        let mut lifecycle = Lifecycle::new();
        assert_eq!(lifecycle.phase, Phase::Idle);

        lifecycle.enter(Phase::Connecting);
        lifecycle.enter(Phase::Connected);
        lifecycle.enter(Phase::Closed);
        assert_eq!(lifecycle.phase, Phase::Closed);
    }
}
