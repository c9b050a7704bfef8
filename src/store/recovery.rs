// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Bounded recovery queue with capacity eviction and drain-on-reconnect.
//!
//! The [`RecoveryStore`] wraps any [`QueueStore`] backend with the policy
//! layer: capacity enforcement with lowest-priority-oldest eviction, and
//! a single-flight replay drain. Eviction is always reported back to the
//! caller and surfaced in logs and metrics; a persisted operation is
//! never silently dropped.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::traits::{QueueStore, StoreError};
use crate::clock::Clock;
use crate::priority::Priority;
use crate::request::PersistedOperation;
use crate::transport::Transport;

/// What happened to the queue when an operation was persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Stored with spare capacity.
    Stored,
    /// Stored, but the queue was full and the named record was evicted
    /// to make room.
    StoredWithEviction {
        evicted_operation_id: String,
        evicted_priority: Priority,
    },
    /// The queue was full of records that all outrank the incoming one,
    /// so the incoming operation itself was the eviction victim and was
    /// not stored.
    EvictedIncoming,
}

/// Result of one replay drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RecoverySummary {
    pub recovered: usize,
    pub failed: usize,
    pub total_time: Duration,
}

/// Pending-queue depth, split out by crisis class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PendingCounts {
    pub total: usize,
    pub crisis: usize,
}

pub struct RecoveryStore {
    store: Arc<dyn QueueStore>,
    capacity: usize,
    clock: Arc<dyn Clock>,
    draining: AtomicBool,
}

impl RecoveryStore {
    pub fn new(store: Arc<dyn QueueStore>, capacity: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            capacity,
            clock,
            draining: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Persist an operation for later replay, evicting the
    /// lowest-priority oldest record when the queue is at capacity.
    ///
    /// The incoming record is itself an eviction candidate: a queued
    /// record is never evicted for an arrival of lower priority.
    pub async fn persist(&self, op: PersistedOperation) -> Result<PersistOutcome, StoreError> {
        let mut outcome = PersistOutcome::Stored;

        if self.store.len().await? >= self.capacity {
            // Re-appends of an already-queued id replace in place and
            // never need room.
            let existing = self.store.load_all().await?;
            let already_queued = existing
                .iter()
                .any(|e| e.request.operation_id == op.request.operation_id);

            if !already_queued {
                let victim = existing
                    .iter()
                    .min_by_key(|e| (e.request.priority, e.enqueued_at))
                    .cloned();
                if let Some(victim) = victim {
                    if (victim.request.priority, victim.enqueued_at)
                        > (op.request.priority, op.enqueued_at)
                    {
                        // Everything queued outranks the arrival.
                        warn!(
                            evicted = %op.request.operation_id,
                            priority = op.request.priority.as_str(),
                            capacity = self.capacity,
                            "Recovery queue full of higher-priority records, dropping arrival"
                        );
                        crate::metrics::record_queue_eviction(op.request.priority.as_str());
                        return Ok(PersistOutcome::EvictedIncoming);
                    }
                    warn!(
                        evicted = %victim.request.operation_id,
                        priority = victim.request.priority.as_str(),
                        capacity = self.capacity,
                        "Recovery queue full, evicting lowest-priority oldest record"
                    );
                    self.store.remove(&victim.request.operation_id).await?;
                    crate::metrics::record_queue_eviction(victim.request.priority.as_str());
                    outcome = PersistOutcome::StoredWithEviction {
                        evicted_operation_id: victim.request.operation_id,
                        evicted_priority: victim.request.priority,
                    };
                }
            }
        }

        crate::metrics::record_persisted(op.request.priority.as_str());
        debug!(
            operation_id = %op.request.operation_id,
            priority = op.request.priority.as_str(),
            crisis_class = op.crisis_class,
            "Operation persisted for replay"
        );
        self.store.append(&op).await?;
        self.update_depth_gauge().await?;
        Ok(outcome)
    }

    /// Replay every pending operation through the transport, highest
    /// priority first, oldest first within a priority.
    ///
    /// Only one drain runs at a time; concurrent calls return an empty
    /// summary immediately. Operations that fail delivery stay queued
    /// with their attempt count bumped.
    pub async fn recover_all(&self, transport: &dyn Transport) -> Result<RecoverySummary, StoreError> {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("Replay drain already in progress, skipping");
            return Ok(RecoverySummary::default());
        }
        let guard = DrainGuard(&self.draining);

        let started = self.clock.now();
        let pending = self.store.load_all().await?;
        if pending.is_empty() {
            drop(guard);
            return Ok(RecoverySummary::default());
        }

        info!(pending = pending.len(), "Starting replay of persisted operations");

        let mut summary = RecoverySummary::default();
        for op in pending {
            match transport.send(&op.request).await {
                Ok(_) => {
                    self.store.remove(&op.request.operation_id).await?;
                    summary.recovered += 1;
                }
                Err(err) => {
                    warn!(
                        operation_id = %op.request.operation_id,
                        error = %err,
                        "Replay delivery failed, operation stays queued"
                    );
                    self.store
                        .record_attempt(&op.request.operation_id, Some(&err.to_string()))
                        .await?;
                    summary.failed += 1;
                }
            }
        }

        summary.total_time = self.clock.now().duration_since(started);
        crate::metrics::record_recovery(
            summary.recovered as u64,
            summary.failed as u64,
            summary.total_time,
        );
        self.update_depth_gauge().await?;
        info!(
            recovered = summary.recovered,
            failed = summary.failed,
            elapsed_ms = summary.total_time.as_millis() as u64,
            "Replay finished"
        );

        drop(guard);
        Ok(summary)
    }

    /// Current queue depth, with crisis-class records counted separately.
    pub async fn pending(&self) -> Result<PendingCounts, StoreError> {
        let ops = self.store.load_all().await?;
        let crisis = ops.iter().filter(|o| o.crisis_class).count();
        Ok(PendingCounts {
            total: ops.len(),
            crisis,
        })
    }

    async fn update_depth_gauge(&self) -> Result<(), StoreError> {
        let counts = self.pending().await?;
        crate::metrics::set_queue_depth(counts.total as u64, counts.crisis as u64);
        Ok(())
    }
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::request::SyncRequest;
    use crate::store::memory::InMemoryQueue;
    use crate::transport::{TransportError, TransportReceipt};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    fn store(capacity: usize) -> RecoveryStore {
        RecoveryStore::new(
            Arc::new(InMemoryQueue::new()),
            capacity,
            Arc::new(SystemClock),
        )
    }

    fn op(id: &str, priority: Priority, enqueued_at: i64) -> PersistedOperation {
        let request = SyncRequest::new(id.to_string(), priority, "safety_plan", id, vec![1]);
        let mut op = PersistedOperation::new(request, None);
        op.enqueued_at = enqueued_at;
        op
    }

    struct ScriptedTransport {
        sent: AtomicUsize,
        fail_ids: Vec<String>,
        order: parking_lot::Mutex<Vec<String>>,
    }

    impl ScriptedTransport {
        fn new(fail_ids: &[&str]) -> Self {
            Self {
                sent: AtomicUsize::new(0),
                fail_ids: fail_ids.iter().map(|s| s.to_string()).collect(),
                order: parking_lot::Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: &SyncRequest) -> Result<TransportReceipt, TransportError> {
            self.sent.fetch_add(1, Ordering::SeqCst);
            self.order.lock().push(request.operation_id.clone());
            if self.fail_ids.contains(&request.operation_id) {
                Err(TransportError::network("connection refused"))
            } else {
                Ok(TransportReceipt::default())
            }
        }
    }

    #[tokio::test]
    async fn test_persist_below_capacity() {
        let store = store(3);
        let outcome = store.persist(op("op-1", Priority::LowSync, 1)).await.unwrap();
        assert_eq!(outcome, PersistOutcome::Stored);
        assert_eq!(store.pending().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_eviction_picks_lowest_priority_oldest() {
        let store = store(3);
        store.persist(op("low-old", Priority::LowSync, 1)).await.unwrap();
        store.persist(op("low-new", Priority::LowSync, 5)).await.unwrap();
        store.persist(op("high", Priority::HighClinical, 2)).await.unwrap();

        let outcome = store
            .persist(op("crit", Priority::CriticalSafety, 9))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            PersistOutcome::StoredWithEviction {
                evicted_operation_id: "low-old".to_string(),
                evicted_priority: Priority::LowSync,
            }
        );

        let counts = store.pending().await.unwrap();
        assert_eq!(counts.total, 3);
        assert_eq!(counts.crisis, 1);
    }

    #[tokio::test]
    async fn test_crisis_records_outlive_lower_priority_ones() {
        let store = store(2);
        store.persist(op("crisis", Priority::CrisisEmergency, 1)).await.unwrap();
        store.persist(op("medium", Priority::MediumUser, 2)).await.unwrap();

        store.persist(op("high", Priority::HighClinical, 3)).await.unwrap();

        let ids: Vec<String> = store
            .store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.request.operation_id)
            .collect();
        assert_eq!(ids, vec!["crisis", "high"]);
    }

    #[tokio::test]
    async fn test_low_priority_arrival_never_displaces_critical_record() {
        let store = store(1);
        store
            .persist(op("critical", Priority::CriticalSafety, 1))
            .await
            .unwrap();

        let outcome = store.persist(op("low", Priority::LowSync, 2)).await.unwrap();
        assert_eq!(outcome, PersistOutcome::EvictedIncoming);

        let counts = store.pending().await.unwrap();
        assert_eq!(counts.total, 1);
        assert_eq!(counts.crisis, 1);
        let ids: Vec<String> = store
            .store
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.request.operation_id)
            .collect();
        assert_eq!(ids, vec!["critical"]);
    }

    #[tokio::test]
    async fn test_equal_priority_arrival_evicts_the_older_record() {
        let store = store(1);
        store.persist(op("old", Priority::LowSync, 1)).await.unwrap();

        let outcome = store.persist(op("new", Priority::LowSync, 2)).await.unwrap();
        assert_eq!(
            outcome,
            PersistOutcome::StoredWithEviction {
                evicted_operation_id: "old".to_string(),
                evicted_priority: Priority::LowSync,
            }
        );
        assert_eq!(store.pending().await.unwrap().total, 1);
    }

    #[tokio::test]
    async fn test_repersist_same_id_never_evicts() {
        let store = store(2);
        store.persist(op("a", Priority::LowSync, 1)).await.unwrap();
        store.persist(op("b", Priority::LowSync, 2)).await.unwrap();

        let outcome = store.persist(op("a", Priority::LowSync, 3)).await.unwrap();
        assert_eq!(outcome, PersistOutcome::Stored);
        assert_eq!(store.pending().await.unwrap().total, 2);
    }

    #[tokio::test]
    async fn test_recover_all_drains_in_priority_order() {
        let store = store(10);
        store.persist(op("low", Priority::LowSync, 1)).await.unwrap();
        store.persist(op("crisis", Priority::CrisisEmergency, 9)).await.unwrap();
        store.persist(op("high", Priority::HighClinical, 2)).await.unwrap();

        let transport = ScriptedTransport::new(&[]);
        let summary = store.recover_all(&transport).await.unwrap();

        assert_eq!(summary.recovered, 3);
        assert_eq!(summary.failed, 0);
        assert_eq!(
            *transport.order.lock(),
            vec!["crisis", "high", "low"]
        );
        assert_eq!(store.pending().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_failed_replays_stay_queued_with_attempt_recorded() {
        let store = store(10);
        store.persist(op("ok", Priority::MediumUser, 1)).await.unwrap();
        store.persist(op("bad", Priority::MediumUser, 2)).await.unwrap();

        let transport = ScriptedTransport::new(&["bad"]);
        let summary = store.recover_all(&transport).await.unwrap();

        assert_eq!(summary.recovered, 1);
        assert_eq!(summary.failed, 1);

        let remaining = store.store.load_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].request.operation_id, "bad");
        assert_eq!(remaining[0].attempts, 1);
        assert!(remaining[0]
            .last_error
            .as_deref()
            .is_some_and(|e| e.contains("connection refused")));
    }

    #[tokio::test]
    async fn test_empty_drain_is_a_noop() {
        let store = store(10);
        let transport = ScriptedTransport::new(&[]);
        let summary = store.recover_all(&transport).await.unwrap();
        assert_eq!(summary, RecoverySummary::default());
        assert_eq!(transport.sent.load(Ordering::SeqCst), 0);
    }
}
