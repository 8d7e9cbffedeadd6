use async_trait::async_trait;
use uuid::Uuid;

/// Trait for components that need to hear how a unit of work ended.
///
/// Observers registered on a [`UnitOfWork`](crate::UnitOfWork) are called
/// after the connection has been released, so they cannot touch the
/// transaction; a typical use is invalidating results cached by a
/// presentation layer once new data has been committed.
#[async_trait]
pub trait TransactionAware: Send + Sync {
    /// Called after a successful commit.
    async fn on_commit(&self, uow_id: Uuid);

    /// Called after the work failed and the transaction was rolled back.
    ///
    /// This also fires when the rollback itself could not be confirmed by
    /// the server; the transaction is discarded with the connection either
    /// way.
    async fn on_rollback(&self, uow_id: Uuid);
}
