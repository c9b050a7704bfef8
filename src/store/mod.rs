// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Durable persistence for deferred operations.
//!
//! [`QueueStore`] is the backend seam (in-memory for tests, SQLite for
//! production); [`RecoveryStore`] layers the capacity and replay policy
//! on top of whichever backend is configured.

pub mod memory;
pub mod recovery;
pub mod sqlite;
pub mod traits;

pub use memory::InMemoryQueue;
pub use recovery::{PendingCounts, PersistOutcome, RecoveryStore, RecoverySummary};
pub use sqlite::SqliteQueue;
pub use traits::{QueueStore, StoreError};
