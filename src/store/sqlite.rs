// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! SQLite-backed durable queue.
//!
//! Pending operations survive process restarts. The table is keyed by
//! `operation_id` with `INSERT OR REPLACE`, so a crashed drain that
//! re-persists an operation never duplicates it.
//!
//! # Schema
//!
//! ```sql
//! CREATE TABLE pending_operations (
//!     operation_id TEXT PRIMARY KEY,
//!     priority     INTEGER NOT NULL,
//!     crisis_class INTEGER NOT NULL,
//!     enqueued_at  INTEGER NOT NULL,
//!     attempts     INTEGER NOT NULL,
//!     last_error   TEXT,
//!     request      TEXT NOT NULL   -- full SyncRequest as JSON
//! );
//! ```

use async_trait::async_trait;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Row, SqlitePool};
use std::path::Path;
use tracing::{debug, info, warn};

use super::traits::{QueueStore, StoreError};
use crate::request::{PersistedOperation, SyncRequest};

pub struct SqliteQueue {
    pool: SqlitePool,
}

impl SqliteQueue {
    /// Open (or create) the queue database at the given path.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let url = format!("sqlite://{}?mode=rwc", path_str);

        info!(path = %path_str, "Opening durable queue");

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&url)
            .await?;

        let queue = Self { pool };
        queue.configure().await?;
        queue.create_schema().await?;

        let pending = queue.len().await?;
        if pending > 0 {
            warn!(pending, "Durable queue has operations from a previous run");
        }

        Ok(queue)
    }

    async fn configure(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA journal_mode = WAL")
            .execute(&self.pool)
            .await?;
        sqlx::query("PRAGMA synchronous = NORMAL")
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn create_schema(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS pending_operations (
                operation_id TEXT PRIMARY KEY,
                priority     INTEGER NOT NULL,
                crisis_class INTEGER NOT NULL,
                enqueued_at  INTEGER NOT NULL,
                attempts     INTEGER NOT NULL DEFAULT 0,
                last_error   TEXT,
                request      TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_pending_priority \
             ON pending_operations (priority DESC, enqueued_at ASC)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Truncate the SQLite write-ahead log to reclaim disk space after a
    /// large drain.
    pub async fn checkpoint(&self) -> Result<(), StoreError> {
        sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await?;
        debug!("Queue checkpoint completed");
        Ok(())
    }
}

#[async_trait]
impl QueueStore for SqliteQueue {
    async fn append(&self, op: &PersistedOperation) -> Result<(), StoreError> {
        let request_json = serde_json::to_string(&op.request)?;
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO pending_operations
                (operation_id, priority, crisis_class, enqueued_at, attempts, last_error, request)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&op.request.operation_id)
        .bind(op.request.priority as i64)
        .bind(op.crisis_class as i64)
        .bind(op.enqueued_at)
        .bind(op.attempts as i64)
        .bind(op.last_error.as_deref())
        .bind(request_json)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load_all(&self) -> Result<Vec<PersistedOperation>, StoreError> {
        let rows = sqlx::query(
            "SELECT crisis_class, enqueued_at, attempts, last_error, request \
             FROM pending_operations \
             ORDER BY priority DESC, enqueued_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        let mut ops = Vec::with_capacity(rows.len());
        for row in rows {
            let request_json: String = row.get("request");
            let request: SyncRequest = serde_json::from_str(&request_json)?;
            ops.push(PersistedOperation {
                request,
                enqueued_at: row.get("enqueued_at"),
                attempts: row.get::<i64, _>("attempts") as u32,
                last_error: row.get("last_error"),
                crisis_class: row.get::<i64, _>("crisis_class") != 0,
            });
        }
        Ok(ops)
    }

    async fn remove(&self, operation_id: &str) -> Result<(), StoreError> {
        sqlx::query("DELETE FROM pending_operations WHERE operation_id = ?")
            .bind(operation_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_attempt(
        &self,
        operation_id: &str,
        last_error: Option<&str>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "UPDATE pending_operations SET attempts = attempts + 1, last_error = ? \
             WHERE operation_id = ?",
        )
        .bind(last_error)
        .bind(operation_id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound(operation_id.to_string()));
        }
        Ok(())
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM pending_operations")
            .fetch_one(&self.pool)
            .await?;
        let count: i64 = row.get("count");
        Ok(count as usize)
    }
}
