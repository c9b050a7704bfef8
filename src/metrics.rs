// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Metrics instrumentation for the resilience engine.
//!
//! Uses the `metrics` crate for backend-agnostic collection. The host
//! application chooses the exporter (Prometheus, OTEL, etc.)
//!
//! # Metric Naming Convention
//! - `resilience_engine_` prefix for all metrics
//! - `_total` suffix for counters
//! - `_seconds` suffix for duration histograms
//!
//! # Labels
//! - `target`: logical backend target (entity type)
//! - `outcome`: success, deferred, rejected, failed
//! - `kind`: error classification tag

use metrics::{counter, gauge, histogram};
use std::time::Duration;

/// Record the final outcome of a resilient sync call.
pub fn record_sync(target: &str, outcome: &str) {
    counter!(
        "resilience_engine_sync_operations_total",
        "target" => target.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record end-to-end sync latency.
pub fn record_sync_latency(outcome: &str, duration: Duration) {
    histogram!(
        "resilience_engine_sync_seconds",
        "outcome" => outcome.to_string()
    )
    .record(duration.as_secs_f64());
}

/// Record one transport attempt.
pub fn record_transport_attempt(target: &str, status: &str) {
    counter!(
        "resilience_engine_transport_attempts_total",
        "target" => target.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// Record a scheduled retry and its backoff delay.
pub fn record_retry(target: &str, delay: Duration) {
    counter!(
        "resilience_engine_retries_total",
        "target" => target.to_string()
    )
    .increment(1);
    histogram!("resilience_engine_backoff_seconds").record(delay.as_secs_f64());
}

/// Record an admission-time rejection (no transport attempt made).
pub fn record_rejection(kind: &str) {
    counter!(
        "resilience_engine_rejections_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// CIRCUIT BREAKER
// ═══════════════════════════════════════════════════════════════════════════

/// Set circuit breaker state (0 = closed, 1 = half-open, 2 = open).
pub fn set_circuit_state(target: &str, state: u8) {
    gauge!(
        "resilience_engine_circuit_state",
        "target" => target.to_string()
    )
    .set(state as f64);
}

/// Record a circuit breaker call outcome.
pub fn record_circuit_call(target: &str, outcome: &str) {
    counter!(
        "resilience_engine_circuit_calls_total",
        "target" => target.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// DEGRADATION
// ═══════════════════════════════════════════════════════════════════════════

/// Set the process-wide degradation level (0 = normal, 1 = limited, 2 = offline).
pub fn set_degradation_level(level: u8) {
    gauge!("resilience_engine_degradation_level").set(level as f64);
}

/// Record a degradation level transition.
pub fn record_degradation_change(level: &str) {
    counter!(
        "resilience_engine_degradation_transitions_total",
        "level" => level.to_string()
    )
    .increment(1);
}

// ═══════════════════════════════════════════════════════════════════════════
// PERSISTENCE & RECOVERY
// ═══════════════════════════════════════════════════════════════════════════

/// Set durable queue depth gauges.
pub fn set_queue_depth(total: u64, crisis: u64) {
    gauge!("resilience_engine_queue_depth").set(total as f64);
    gauge!("resilience_engine_queue_crisis_depth").set(crisis as f64);
}

/// Record a persisted operation.
pub fn record_persisted(priority: &str) {
    counter!(
        "resilience_engine_persisted_total",
        "priority" => priority.to_string()
    )
    .increment(1);
}

/// Record a capacity eviction from the durable queue.
pub fn record_queue_eviction(priority: &str) {
    counter!(
        "resilience_engine_queue_evictions_total",
        "priority" => priority.to_string()
    )
    .increment(1);
}

/// Record a recovery pass.
pub fn record_recovery(recovered: u64, failed: u64, duration: Duration) {
    counter!("resilience_engine_recovered_total").increment(recovered);
    counter!("resilience_engine_recovery_failures_total").increment(failed);
    histogram!("resilience_engine_recovery_seconds").record(duration.as_secs_f64());
}

// ═══════════════════════════════════════════════════════════════════════════
// CRISIS FAST PATH
// ═══════════════════════════════════════════════════════════════════════════

/// Record a crisis operation and its latency.
pub fn record_crisis(outcome: &str, duration: Duration) {
    counter!(
        "resilience_engine_crisis_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
    histogram!("resilience_engine_crisis_seconds").record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    // These verify the API compiles and doesn't panic without a recorder
    // installed. Assertions against values belong to metrics-util recorders.

    #[test]
    fn test_sync_counters() {
        record_sync("mood_checkin", "success");
        record_sync("safety_plan", "deferred");
        record_sync_latency("success", Duration::from_millis(12));
        record_transport_attempt("mood_checkin", "failure");
        record_retry("mood_checkin", Duration::from_millis(200));
        record_rejection("degradation_rejected");
    }

    #[test]
    fn test_circuit_metrics() {
        set_circuit_state("mood_checkin", 2);
        record_circuit_call("mood_checkin", "rejected");
    }

    #[test]
    fn test_degradation_metrics() {
        set_degradation_level(1);
        record_degradation_change("limited");
    }

    #[test]
    fn test_queue_metrics() {
        set_queue_depth(42, 3);
        record_persisted("low_sync");
        record_queue_eviction("low_sync");
        record_recovery(10, 2, Duration::from_millis(80));
    }

    #[test]
    fn test_crisis_metrics() {
        record_crisis("delivered", Duration::from_millis(90));
        record_crisis("fallback", Duration::from_millis(151));
    }
}
