// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Sync orchestrator.
//!
//! The [`SyncOrchestrator`] ties the resilience components together around
//! a caller-supplied [`Transport`]:
//! - crisis fast path for emergency operations
//! - degradation admission before any transport work
//! - per-target circuit breakers with priority exemption
//! - bounded exponential retry with jitter
//! - durable persistence and replay for everything that cannot be
//!   delivered now
//!
//! # Failure semantics
//!
//! The only hard failures callers see are non-retryable classifications
//! (today: authentication) and admission-time rejections. Every other
//! outcome is either a confirmed delivery or a durable deferral reported
//! as success-with-fallback.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use serde::Serialize;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, EngineConfig};
use crate::crisis::CrisisResponder;
use crate::error::{SyncError, SyncErrorKind};
use crate::request::{PersistedOperation, SyncRequest};
use crate::resilience::{
    Admission, CircuitSnapshot, CircuitState, DegradationController, DegradationLevel,
    RetryController, RetryDecision, TargetCircuits,
};
use crate::result::{PerformanceMetrics, SyncResult};
use crate::store::{
    InMemoryQueue, PendingCounts, QueueStore, RecoveryStore, RecoverySummary, SqliteQueue,
    StoreError,
};
use crate::transport::Transport;

/// Startup failures.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("queue storage error: {0}")]
    Store(#[from] StoreError),
}

/// Coarse operator-facing health summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthClassification {
    Healthy,
    Degraded,
    Critical,
}

/// Point-in-time snapshot of engine state and counters.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStats {
    pub health: HealthClassification,
    pub degradation_level: DegradationLevel,
    pub circuits: Vec<CircuitSnapshot>,
    pub pending_total: usize,
    pub pending_crisis: usize,
    pub ops_total: u64,
    pub ops_completed: u64,
    pub ops_deferred: u64,
    pub ops_rejected: u64,
    pub ops_failed: u64,
    pub ops_crisis: u64,
    pub transport_attempts: u64,
    /// Mean transport attempts per operation that reached the transport.
    pub avg_attempts: f64,
}

pub struct SyncOrchestrator {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    retry: RetryController,
    circuits: TargetCircuits,
    degradation: DegradationController,
    recovery: RecoveryStore,
    crisis: CrisisResponder,

    ops_total: AtomicU64,
    ops_completed: AtomicU64,
    ops_deferred: AtomicU64,
    ops_rejected: AtomicU64,
    ops_failed: AtomicU64,
    ops_crisis: AtomicU64,
    transport_attempts: AtomicU64,
}

impl SyncOrchestrator {
    /// Create an orchestrator with the configured queue backend: SQLite
    /// when `recovery.queue_path` is set, in-memory otherwise.
    pub async fn new(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let store: Arc<dyn QueueStore> = match &config.recovery.queue_path {
            Some(path) => Arc::new(SqliteQueue::open(path).await?),
            None => {
                info!("No queue path configured, pending operations will not survive restart");
                Arc::new(InMemoryQueue::new())
            }
        };
        Self::with_store(config, transport, store, Arc::new(SystemClock))
    }

    /// Create an orchestrator over an explicit queue backend and clock.
    pub fn with_store(
        config: EngineConfig,
        transport: Arc<dyn Transport>,
        store: Arc<dyn QueueStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        Ok(Self {
            transport,
            retry: RetryController::new(config.retry, clock.clone()),
            circuits: TargetCircuits::new(config.circuit, clock.clone()),
            degradation: DegradationController::new(config.degradation),
            recovery: RecoveryStore::new(store, config.recovery.capacity, clock.clone()),
            crisis: CrisisResponder::new(config.crisis, clock.clone()),
            clock,
            ops_total: AtomicU64::new(0),
            ops_completed: AtomicU64::new(0),
            ops_deferred: AtomicU64::new(0),
            ops_rejected: AtomicU64::new(0),
            ops_failed: AtomicU64::new(0),
            ops_crisis: AtomicU64::new(0),
            transport_attempts: AtomicU64::new(0),
        })
    }

    /// Execute one sync operation to completion, deferral, or rejection.
    #[tracing::instrument(
        skip(self, request),
        fields(operation_id = %request.operation_id, priority = request.priority.as_str())
    )]
    pub async fn execute_resilient_sync(&self, request: SyncRequest) -> SyncResult {
        self.run(request, None).await
    }

    /// Like [`execute_resilient_sync`](Self::execute_resilient_sync), but
    /// abandons retry waits when `cancel` flips to `true`. Cancellation
    /// between attempts surfaces as a hard failure; an attempt already in
    /// flight is allowed to finish.
    #[tracing::instrument(
        skip(self, request, cancel),
        fields(operation_id = %request.operation_id, priority = request.priority.as_str())
    )]
    pub async fn execute_resilient_sync_with_cancel(
        &self,
        request: SyncRequest,
        cancel: watch::Receiver<bool>,
    ) -> SyncResult {
        self.run(request, Some(cancel)).await
    }

    /// Route a crisis operation straight to the fast path.
    #[tracing::instrument(skip(self, request), fields(operation_id = %request.operation_id))]
    pub async fn handle_crisis_emergency(&self, request: SyncRequest) -> SyncResult {
        let request = request.crisis_flagged();
        self.ops_total.fetch_add(1, Ordering::Relaxed);
        self.ops_crisis.fetch_add(1, Ordering::Relaxed);
        self.transport_attempts.fetch_add(1, Ordering::Relaxed);
        self.crisis.handle(&request, self.transport.as_ref()).await
    }

    async fn run(&self, request: SyncRequest, mut cancel: Option<watch::Receiver<bool>>) -> SyncResult {
        let is_crisis =
            request.crisis || request.priority == crate::priority::Priority::CrisisEmergency;
        if is_crisis && self.retry.policy().crisis_override {
            return self.handle_crisis_emergency(request).await;
        }

        self.ops_total.fetch_add(1, Ordering::Relaxed);
        let started = self.clock.now();
        let target = request.metadata.entity_type.clone();

        if !self.degradation.is_admitted(request.priority) {
            let level = self.degradation.level();
            debug!(level = %level, "Operation rejected by degradation control");
            self.ops_rejected.fetch_add(1, Ordering::Relaxed);
            crate::metrics::record_rejection(SyncErrorKind::DegradationRejected.as_str());
            crate::metrics::record_sync(&target, "rejected");
            return SyncResult::rejected(
                SyncErrorKind::DegradationRejected,
                format!("degradation level {level} rejects {} operations", request.priority),
            );
        }

        let breaker = self.circuits.breaker(&target);
        let exempt = request.priority.circuit_exempt();
        let mut perf = PerformanceMetrics::default();
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let admission = breaker.admit(exempt);
            if admission == Admission::Rejected {
                debug!(target = %target, attempt, "Circuit open, deferring operation");
                crate::metrics::record_rejection(SyncErrorKind::CircuitOpenRejected.as_str());
                let err = SyncError::new(
                    SyncErrorKind::CircuitOpenRejected,
                    format!("circuit open for target {target}"),
                );
                perf.total_elapsed = self.clock.now().duration_since(started);
                return self.defer(request, err, perf, &target).await;
            }

            self.transport_attempts.fetch_add(1, Ordering::Relaxed);
            perf.total_attempts = attempt;
            let send_result = self.transport.send(&request).await;

            match send_result {
                Ok(_receipt) => {
                    breaker.record_success(admission);
                    self.degradation.record_healthy();
                    self.ops_completed.fetch_add(1, Ordering::Relaxed);
                    perf.total_elapsed = self.clock.now().duration_since(started);
                    crate::metrics::record_transport_attempt(&target, "ok");
                    crate::metrics::record_sync(&target, "completed");
                    crate::metrics::record_sync_latency("completed", perf.total_elapsed);
                    debug!(attempt, "Operation delivered");
                    return SyncResult::completed(perf);
                }
                Err(transport_err) => {
                    let kind = transport_err.kind;
                    crate::metrics::record_transport_attempt(&target, kind.as_str());

                    if kind.counts_toward_breaker() {
                        breaker.record_failure(admission);
                    } else {
                        breaker.release(admission);
                    }
                    if kind == SyncErrorKind::ServiceUnavailable {
                        self.degradation.record_unavailable();
                    }

                    let err: SyncError = transport_err.into();
                    if !kind.is_retryable() {
                        warn!(error = %err, attempt, "Non-retryable failure");
                        self.ops_failed.fetch_add(1, Ordering::Relaxed);
                        perf.total_elapsed = self.clock.now().duration_since(started);
                        crate::metrics::record_sync(&target, "failed");
                        crate::metrics::record_sync_latency("failed", perf.total_elapsed);
                        return SyncResult::failed(err, perf);
                    }

                    match self.retry.decide(kind, attempt) {
                        RetryDecision::RetryAfter(delay) => {
                            debug!(
                                error = %err,
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                "Transient failure, backing off"
                            );
                            crate::metrics::record_retry(&target, delay);
                            perf.queue_wait += delay;
                            if let Some(reason) = self.backoff(delay, cancel.as_mut()).await {
                                self.ops_failed.fetch_add(1, Ordering::Relaxed);
                                perf.total_elapsed = self.clock.now().duration_since(started);
                                crate::metrics::record_sync(&target, "cancelled");
                                return SyncResult::failed(reason, perf);
                            }
                        }
                        RetryDecision::Stop => {
                            debug!(error = %err, attempt, "Retry budget exhausted, deferring");
                            perf.total_elapsed = self.clock.now().duration_since(started);
                            return self.defer(request, err, perf, &target).await;
                        }
                    }
                }
            }
        }
    }

    /// Wait out a backoff delay, watching for cancellation. Returns the
    /// cancellation error when the wait was abandoned.
    async fn backoff(
        &self,
        delay: std::time::Duration,
        cancel: Option<&mut watch::Receiver<bool>>,
    ) -> Option<SyncError> {
        let Some(cancel) = cancel else {
            self.clock.sleep(delay).await;
            return None;
        };

        if *cancel.borrow() {
            return Some(cancelled());
        }
        loop {
            tokio::select! {
                _ = self.clock.sleep(delay) => return None,
                changed = cancel.changed() => {
                    // A dropped sender also ends the wait.
                    if changed.is_err() || *cancel.borrow() {
                        return Some(cancelled());
                    }
                }
            }
        }
    }

    async fn defer(
        &self,
        request: SyncRequest,
        err: SyncError,
        perf: PerformanceMetrics,
        target: &str,
    ) -> SyncResult {
        let op = PersistedOperation::new(request, Some(err.to_string()));
        match self.recovery.persist(op).await {
            Ok(_) => {
                self.ops_deferred.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_sync(target, "deferred");
                crate::metrics::record_sync_latency("deferred", perf.total_elapsed);
                SyncResult::deferred(err, perf)
            }
            Err(store_err) => {
                error!(error = %store_err, "Failed to persist deferred operation");
                self.ops_failed.fetch_add(1, Ordering::Relaxed);
                crate::metrics::record_sync(target, "persist_failed");
                SyncResult::failed(err, perf)
            }
        }
    }

    /// Replay all persisted operations through the transport.
    pub async fn recover_all(&self) -> Result<RecoverySummary, StoreError> {
        let summary = self.recovery.recover_all(self.transport.as_ref()).await?;
        if summary.recovered > 0 {
            self.degradation.record_healthy();
        }
        Ok(summary)
    }

    /// Explicitly set the degradation level.
    pub fn set_degradation_level(&self, level: DegradationLevel, reason: &str) {
        self.degradation.set_level(level, reason);
    }

    #[must_use]
    pub fn degradation_level(&self) -> DegradationLevel {
        self.degradation.level()
    }

    /// Operator-facing snapshot of counters, breaker states, and queue
    /// depth.
    pub async fn stats(&self) -> Result<EngineStats, StoreError> {
        let PendingCounts { total, crisis } = self.recovery.pending().await?;
        let circuits = self.circuits.snapshots();
        let degradation_level = self.degradation.level();

        let any_open = self.circuits.any_in_state(CircuitState::Open);
        let any_half_open = self.circuits.any_in_state(CircuitState::HalfOpen);
        let health = if degradation_level == DegradationLevel::Offline || any_open {
            HealthClassification::Critical
        } else if degradation_level == DegradationLevel::Limited || any_half_open || total > 0 {
            HealthClassification::Degraded
        } else {
            HealthClassification::Healthy
        };

        let ops_total = self.ops_total.load(Ordering::Relaxed);
        let ops_rejected = self.ops_rejected.load(Ordering::Relaxed);
        let transport_attempts = self.transport_attempts.load(Ordering::Relaxed);
        let attempted_ops = ops_total.saturating_sub(ops_rejected);

        Ok(EngineStats {
            health,
            degradation_level,
            circuits,
            pending_total: total,
            pending_crisis: crisis,
            ops_total,
            ops_completed: self.ops_completed.load(Ordering::Relaxed),
            ops_deferred: self.ops_deferred.load(Ordering::Relaxed),
            ops_rejected,
            ops_failed: self.ops_failed.load(Ordering::Relaxed),
            ops_crisis: self.ops_crisis.load(Ordering::Relaxed),
            transport_attempts,
            avg_attempts: if attempted_ops == 0 {
                0.0
            } else {
                transport_attempts as f64 / attempted_ops as f64
            },
        })
    }
}

fn cancelled() -> SyncError {
    SyncError::new(SyncErrorKind::Cancelled, "operation cancelled by caller")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedJitterClock;
    use crate::priority::Priority;
    use crate::resilience::RetryPolicy;
    use crate::transport::{TransportError, TransportReceipt};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    struct FlakyTransport {
        calls: AtomicUsize,
        fail_first: usize,
        error: fn(&'static str) -> TransportError,
    }

    impl FlakyTransport {
        fn failing_first(n: usize) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: n,
                error: TransportError::network,
            }
        }

        fn always_auth_failure() -> Self {
            Self {
                calls: AtomicUsize::new(0),
                fail_first: usize::MAX,
                error: TransportError::authentication,
            }
        }
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn send(&self, _request: &SyncRequest) -> Result<TransportReceipt, TransportError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err((self.error)("scripted failure"))
            } else {
                Ok(TransportReceipt::default())
            }
        }
    }

    fn orchestrator(transport: Arc<dyn Transport>) -> SyncOrchestrator {
        SyncOrchestrator::with_store(
            EngineConfig::default(),
            transport,
            Arc::new(InMemoryQueue::new()),
            Arc::new(FixedJitterClock::zero()),
        )
        .unwrap()
    }

    fn request(id: &str, priority: Priority) -> SyncRequest {
        SyncRequest::new(id.to_string(), priority, "mood_checkin", id, vec![1])
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_after_transient_failures() {
        let transport = Arc::new(FlakyTransport::failing_first(2));
        let engine = orchestrator(transport.clone());

        let result = engine
            .execute_resilient_sync(request("op-1", Priority::MediumUser))
            .await;

        assert!(result.success);
        assert!(!result.fallback_triggered);
        assert_eq!(result.performance.total_attempts, 3);
        // Backoff waits: 200ms then 400ms with zero jitter.
        assert_eq!(result.performance.queue_wait, Duration::from_millis(600));
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_defer_not_fail() {
        let transport = Arc::new(FlakyTransport::failing_first(usize::MAX));
        let engine = orchestrator(transport.clone());

        let result = engine
            .execute_resilient_sync(request("op-1", Priority::MediumUser))
            .await;

        assert!(result.success);
        assert!(result.fallback_triggered);
        assert!(result.retry_recommended);
        assert_eq!(result.performance.total_attempts, 3);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.pending_total, 1);
        assert_eq!(stats.ops_deferred, 1);
    }

    #[tokio::test]
    async fn test_authentication_is_a_hard_failure() {
        let transport = Arc::new(FlakyTransport::always_auth_failure());
        let engine = orchestrator(transport.clone());

        let result = engine
            .execute_resilient_sync(request("op-1", Priority::HighClinical))
            .await;

        assert!(!result.success);
        assert!(!result.fallback_triggered);
        assert_eq!(result.performance.total_attempts, 1);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
        assert_eq!(engine.stats().await.unwrap().pending_total, 0);
    }

    #[tokio::test]
    async fn test_degradation_rejects_low_priority_without_attempt() {
        let transport = Arc::new(FlakyTransport::failing_first(0));
        let engine = orchestrator(transport.clone());
        engine.set_degradation_level(DegradationLevel::Offline, "test");

        let result = engine
            .execute_resilient_sync(request("op-1", Priority::MediumUser))
            .await;

        assert!(!result.success);
        assert_eq!(
            result.error.unwrap().kind,
            SyncErrorKind::DegradationRejected
        );
        assert_eq!(transport.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(FlakyTransport::failing_first(usize::MAX));
        let engine = orchestrator(transport.clone());
        let (tx, rx) = watch::channel(false);

        let handle = {
            let req = request("op-1", Priority::MediumUser);
            tokio::spawn(async move { engine.execute_resilient_sync_with_cancel(req, rx).await })
        };

        // Let the first attempt fail and enter backoff, then cancel.
        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(true).unwrap();

        let result = handle.await.unwrap();
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, SyncErrorKind::Cancelled);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_crisis_flag_routes_to_fast_path() {
        let transport = Arc::new(FlakyTransport::failing_first(usize::MAX));
        let engine = orchestrator(transport.clone());

        let result = engine
            .execute_resilient_sync(request("op-1", Priority::LowSync).crisis_flagged())
            .await;

        assert!(result.success);
        assert!(result.crisis_override_used);
        assert!(result.crisis_fallback.is_some());
        assert_eq!(engine.stats().await.unwrap().ops_crisis, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_crisis_override_uses_ordinary_retry_path() {
        let transport = Arc::new(FlakyTransport::failing_first(usize::MAX));
        let config = EngineConfig {
            retry: RetryPolicy {
                crisis_override: false,
                ..RetryPolicy::default()
            },
            ..EngineConfig::default()
        };
        let engine = SyncOrchestrator::with_store(
            config,
            transport.clone(),
            Arc::new(InMemoryQueue::new()),
            Arc::new(FixedJitterClock::zero()),
        )
        .unwrap();

        let result = engine
            .execute_resilient_sync(request("op-1", Priority::LowSync).crisis_flagged())
            .await;

        // No fast path: the full retry budget is spent and the operation
        // is deferred like any other exhausted request.
        assert!(!result.crisis_override_used);
        assert!(result.crisis_fallback.is_none());
        assert_eq!(result.performance.total_attempts, 3);
        assert_eq!(transport.calls.load(Ordering::SeqCst), 3);

        let stats = engine.stats().await.unwrap();
        assert_eq!(stats.ops_crisis, 0);
        assert_eq!(stats.ops_deferred, 1);
    }

    #[tokio::test]
    async fn test_stats_health_transitions() {
        let transport = Arc::new(FlakyTransport::failing_first(0));
        let engine = orchestrator(transport);

        assert_eq!(
            engine.stats().await.unwrap().health,
            HealthClassification::Healthy
        );

        engine.set_degradation_level(DegradationLevel::Limited, "test");
        assert_eq!(
            engine.stats().await.unwrap().health,
            HealthClassification::Degraded
        );

        engine.set_degradation_level(DegradationLevel::Offline, "test");
        assert_eq!(
            engine.stats().await.unwrap().health,
            HealthClassification::Critical
        );
    }
}
