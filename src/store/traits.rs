//! Storage traits for the durable recovery queue.

use async_trait::async_trait;
use thiserror::Error;

use crate::request::PersistedOperation;

/// Errors from queue storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("operation not found: {0}")]
    NotFound(String),

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Backend(e.to_string())
    }
}

/// Durable queue of operations awaiting replay.
///
/// Implementations must make `append` idempotent on `operation_id`: a
/// re-append after a crash replaces the previous record rather than
/// duplicating it.
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Insert or replace an operation keyed by its `operation_id`.
    async fn append(&self, op: &PersistedOperation) -> Result<(), StoreError>;

    /// All pending operations, highest priority first, oldest first
    /// within a priority.
    async fn load_all(&self) -> Result<Vec<PersistedOperation>, StoreError>;

    /// Remove a completed operation. Removing an unknown id is not an
    /// error; replay after a partial drain must not fail.
    async fn remove(&self, operation_id: &str) -> Result<(), StoreError>;

    /// Bump the attempt counter and record the last error text.
    async fn record_attempt(
        &self,
        operation_id: &str,
        last_error: Option<&str>,
    ) -> Result<(), StoreError>;

    /// Number of pending operations.
    async fn len(&self) -> Result<usize, StoreError>;

    async fn is_empty(&self) -> Result<bool, StoreError> {
        Ok(self.len().await? == 0)
    }
}
