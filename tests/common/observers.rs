use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use uuid::Uuid;

use query_unit_of_work::TransactionAware;

/// Transaction-aware observer that records every notification
pub struct RecordingObserver {
    committed: RwLock<Vec<Uuid>>,
    rolled_back: RwLock<Vec<Uuid>>,
}

impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            committed: RwLock::new(Vec::new()),
            rolled_back: RwLock::new(Vec::new()),
        })
    }

    pub fn commits(&self) -> usize {
        self.committed.read().len()
    }

    pub fn rollbacks(&self) -> usize {
        self.rolled_back.read().len()
    }
}

#[async_trait]
impl TransactionAware for RecordingObserver {
    async fn on_commit(&self, uow_id: Uuid) {
        self.committed.write().push(uow_id);
    }

    async fn on_rollback(&self, uow_id: Uuid) {
        self.rolled_back.write().push(uow_id);
    }
}
