// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Per-target circuit breaker.
//!
//! Admission-control state machine protecting each logical backend target:
//!
//! - **Closed**: calls pass through; failures within `monitoring_window`
//!   are counted; reaching `failure_threshold` trips to Open.
//! - **Open**: calls are rejected without a transport attempt, except for
//!   exempt priorities; after `recovery_timeout` the next call becomes a
//!   half-open trial.
//! - **HalfOpen**: up to `half_open_max_calls` concurrent trial calls;
//!   `success_threshold` consecutive successes close the breaker; any trial
//!   failure reopens it and restarts the recovery timer.
//!
//! Breakers for different targets are fully independent: state lives in a
//! per-breaker mutex inside a [`DashMap`] registry, so a failure storm on
//! one target never serializes admission checks on another.

use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::clock::Clock;

/// Circuit breaker state for metrics/monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed = 0,
    HalfOpen = 1,
    Open = 2,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::HalfOpen => write!(f, "half_open"),
            Self::Open => write!(f, "open"),
        }
    }
}

/// Configuration for a circuit breaker.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures within `monitoring_window` that trip Closed → Open.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker.
    pub success_threshold: u32,
    /// How long Open lasts before the next call becomes a trial.
    pub recovery_timeout: Duration,
    /// Sliding window for failure counting while Closed.
    pub monitoring_window: Duration,
    /// Concurrent trial calls admitted while HalfOpen.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            recovery_timeout: Duration::from_secs(30),
            monitoring_window: Duration::from_secs(60),
            half_open_max_calls: 1,
        }
    }
}

impl CircuitBreakerConfig {
    /// Aggressive config for critical targets (trips faster, recovers cautiously).
    #[must_use]
    pub fn aggressive() -> Self {
        Self {
            failure_threshold: 3,
            success_threshold: 3,
            recovery_timeout: Duration::from_secs(60),
            ..Self::default()
        }
    }

    /// Lenient config for low-stakes targets (tolerates more failures).
    #[must_use]
    pub fn lenient() -> Self {
        Self {
            failure_threshold: 10,
            success_threshold: 1,
            recovery_timeout: Duration::from_secs(15),
            ..Self::default()
        }
    }
}

/// How a call was admitted. Must be passed back to `record_success` /
/// `record_failure` (or `release`) so half-open trial slots are returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Normal pass-through while Closed.
    Allowed,
    /// A half-open trial call.
    Trial,
    /// Exempt priority passing through an Open/HalfOpen breaker.
    ExemptBypass,
    /// Rejected: no transport attempt may be made.
    Rejected,
}

impl Admission {
    /// Whether the call may proceed to the transport.
    #[must_use]
    pub fn is_allowed(self) -> bool {
        !matches!(self, Self::Rejected)
    }
}

struct BreakerInner {
    state: CircuitState,
    /// Failure instants within the monitoring window (Closed only).
    window: VecDeque<Instant>,
    opened_at: Option<Instant>,
    half_open_in_flight: u32,
    half_open_successes: u32,
}

/// A named circuit breaker with metrics tracking.
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    inner: Mutex<BreakerInner>,

    // Metrics
    calls_total: AtomicU64,
    successes: AtomicU64,
    failures: AtomicU64,
    rejections: AtomicU64,
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            target: target.into(),
            config,
            clock,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                window: VecDeque::new(),
                opened_at: None,
                half_open_in_flight: 0,
                half_open_successes: 0,
            }),
            calls_total: AtomicU64::new(0),
            successes: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    #[must_use]
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Current state. Open → HalfOpen happens lazily on the next `admit`,
    /// so an expired Open breaker still reports Open here.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    /// Ask the breaker whether a call may proceed.
    pub fn admit(&self, exempt: bool) -> Admission {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        match inner.state {
            CircuitState::Closed => Admission::Allowed,
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .is_some_and(|at| now.duration_since(at) >= self.config.recovery_timeout);
                if expired {
                    inner.state = CircuitState::HalfOpen;
                    inner.half_open_in_flight = 1;
                    inner.half_open_successes = 0;
                    info!(target = %self.target, "Circuit half-open, admitting trial call");
                    crate::metrics::set_circuit_state(&self.target, CircuitState::HalfOpen as u8);
                    Admission::Trial
                } else if exempt {
                    debug!(target = %self.target, "Exempt priority bypassing open circuit");
                    crate::metrics::record_circuit_call(&self.target, "exempt_bypass");
                    Admission::ExemptBypass
                } else {
                    self.rejections.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_circuit_call(&self.target, "rejected");
                    Admission::Rejected
                }
            }
            CircuitState::HalfOpen => {
                if inner.half_open_in_flight < self.config.half_open_max_calls {
                    inner.half_open_in_flight += 1;
                    Admission::Trial
                } else if exempt {
                    crate::metrics::record_circuit_call(&self.target, "exempt_bypass");
                    Admission::ExemptBypass
                } else {
                    // Trial slots exhausted: rejected identically to Open.
                    self.rejections.fetch_add(1, Ordering::Relaxed);
                    crate::metrics::record_circuit_call(&self.target, "rejected");
                    Admission::Rejected
                }
            }
        }
    }

    /// Report a successful transport call admitted as `admission`.
    pub fn record_success(&self, admission: Admission) {
        self.successes.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_circuit_call(&self.target, "success");

        if admission != Admission::Trial {
            return;
        }
        let mut inner = self.inner.lock();
        inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        if inner.state != CircuitState::HalfOpen {
            // A concurrent trial failure already reopened the breaker.
            return;
        }
        inner.half_open_successes += 1;
        if inner.half_open_successes >= self.config.success_threshold {
            inner.state = CircuitState::Closed;
            inner.window.clear();
            inner.opened_at = None;
            inner.half_open_successes = 0;
            info!(target = %self.target, "Circuit closed after successful trials");
            crate::metrics::set_circuit_state(&self.target, CircuitState::Closed as u8);
        }
    }

    /// Report a failed transport call admitted as `admission`.
    ///
    /// Only transient error kinds should be reported here; authentication
    /// failures go through [`release`](Self::release) instead.
    pub fn record_failure(&self, admission: Admission) {
        self.failures.fetch_add(1, Ordering::Relaxed);
        crate::metrics::record_circuit_call(&self.target, "failure");
        let now = self.clock.now();
        let mut inner = self.inner.lock();

        match admission {
            Admission::Trial => {
                inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.half_open_successes = 0;
                warn!(target = %self.target, "Trial call failed, circuit reopened");
                crate::metrics::set_circuit_state(&self.target, CircuitState::Open as u8);
            }
            Admission::Allowed => {
                if inner.state != CircuitState::Closed {
                    return;
                }
                inner.window.push_back(now);
                let cutoff = now.checked_sub(self.config.monitoring_window);
                if let Some(cutoff) = cutoff {
                    while inner.window.front().is_some_and(|&t| t < cutoff) {
                        inner.window.pop_front();
                    }
                }
                if inner.window.len() as u32 >= self.config.failure_threshold {
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                    warn!(
                        target = %self.target,
                        failures = inner.window.len(),
                        "Failure threshold reached, circuit opened"
                    );
                    crate::metrics::set_circuit_state(&self.target, CircuitState::Open as u8);
                }
            }
            // Exempt traffic probes a known-bad target; its failures must
            // not extend the recovery timer.
            Admission::ExemptBypass | Admission::Rejected => {}
        }
    }

    /// Return an admission without recording an outcome, for failures that
    /// say nothing about target health (e.g. authentication).
    pub fn release(&self, admission: Admission) {
        if admission == Admission::Trial {
            let mut inner = self.inner.lock();
            inner.half_open_in_flight = inner.half_open_in_flight.saturating_sub(1);
        }
    }

    #[must_use]
    pub fn calls_total(&self) -> u64 {
        self.calls_total.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn successes(&self) -> u64 {
        self.successes.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn rejections(&self) -> u64 {
        self.rejections.load(Ordering::Relaxed)
    }

    /// Failure rate (0.0 - 1.0) over all recorded calls.
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.calls_total();
        if total == 0 {
            return 0.0;
        }
        self.failures() as f64 / total as f64
    }
}

/// Point-in-time view of one target's breaker, for the stats surface.
#[derive(Debug, Clone, serde::Serialize)]
pub struct CircuitSnapshot {
    pub target: String,
    pub state: CircuitState,
    pub calls_total: u64,
    pub successes: u64,
    pub failures: u64,
    pub rejections: u64,
}

/// Registry of per-target circuit breakers.
///
/// Targets are created lazily on first use; state for different targets
/// never shares a lock.
pub struct TargetCircuits {
    config: CircuitBreakerConfig,
    clock: Arc<dyn Clock>,
    circuits: DashMap<String, Arc<CircuitBreaker>>,
}

impl TargetCircuits {
    pub fn new(config: CircuitBreakerConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            circuits: DashMap::new(),
        }
    }

    /// Get or create the breaker for a logical target.
    pub fn breaker(&self, target: &str) -> Arc<CircuitBreaker> {
        self.circuits
            .entry(target.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(
                    target,
                    self.config.clone(),
                    self.clock.clone(),
                ))
            })
            .clone()
    }

    /// Snapshot all known targets.
    pub fn snapshots(&self) -> Vec<CircuitSnapshot> {
        self.circuits
            .iter()
            .map(|entry| {
                let cb = entry.value();
                CircuitSnapshot {
                    target: cb.target().to_string(),
                    state: cb.state(),
                    calls_total: cb.calls_total(),
                    successes: cb.successes(),
                    failures: cb.failures(),
                    rejections: cb.rejections(),
                }
            })
            .collect()
    }

    /// Whether any target's breaker is currently in the given state.
    pub fn any_in_state(&self, state: CircuitState) -> bool {
        self.circuits.iter().any(|entry| entry.value().state() == state)
    }
}
