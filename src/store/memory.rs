//! In-memory queue store.
//!
//! Used in tests and in deployments that accept losing the pending queue
//! on process exit. Semantics match [`SqliteQueue`](super::sqlite::SqliteQueue)
//! exactly, minus durability.

use async_trait::async_trait;
use dashmap::DashMap;

use super::traits::{QueueStore, StoreError};
use crate::request::PersistedOperation;

#[derive(Default)]
pub struct InMemoryQueue {
    operations: DashMap<String, PersistedOperation>,
}

impl InMemoryQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for InMemoryQueue {
    async fn append(&self, op: &PersistedOperation) -> Result<(), StoreError> {
        self.operations
            .insert(op.request.operation_id.clone(), op.clone());
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<PersistedOperation>, StoreError> {
        let mut ops: Vec<PersistedOperation> =
            self.operations.iter().map(|e| e.value().clone()).collect();
        ops.sort_by(|a, b| {
            b.request
                .priority
                .cmp(&a.request.priority)
                .then(a.enqueued_at.cmp(&b.enqueued_at))
        });
        Ok(ops)
    }

    async fn remove(&self, operation_id: &str) -> Result<(), StoreError> {
        self.operations.remove(operation_id);
        Ok(())
    }

    async fn record_attempt(
        &self,
        operation_id: &str,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let mut entry = self
            .operations
            .get_mut(operation_id)
            .ok_or_else(|| StoreError::NotFound(operation_id.to_string()))?;
        entry.attempts += 1;
        entry.last_error = last_error.map(str::to_string);
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        Ok(self.operations.len())
    }
}
