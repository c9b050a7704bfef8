//! Outcome values returned to callers.
//!
//! The engine's failure semantics are encoded here: the only hard failures
//! a caller sees are non-retryable classifications and admission-time
//! rejections. Everything else either completes or is durably deferred,
//! reported as success-with-fallback.

use serde::Serialize;
use std::time::Duration;

use crate::crisis::CrisisFallback;
use crate::error::{SyncError, SyncErrorKind};

/// Timing and effort accounting for one `execute_resilient_sync` call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PerformanceMetrics {
    /// Transport attempts made (zero for admission-time rejections).
    pub total_attempts: u32,
    /// Wall time from entry to result.
    pub total_elapsed: Duration,
    /// Time spent waiting in backoff between attempts.
    pub queue_wait: Duration,
}

/// Outcome of a sync operation.
#[derive(Debug, Clone, Serialize)]
pub struct SyncResult {
    /// True when the operation completed or was durably deferred.
    pub success: bool,
    /// True when the result was synthesized locally (persisted for replay,
    /// or a crisis fallback) instead of confirmed by the backend.
    pub fallback_triggered: bool,
    /// True when the crisis fast path handled the request.
    pub crisis_override_used: bool,
    /// Guidance for the caller: whether retrying later can help.
    pub retry_recommended: bool,
    pub error: Option<SyncError>,
    pub performance: PerformanceMetrics,
    /// Locally known emergency resources, present only on crisis fallbacks.
    pub crisis_fallback: Option<CrisisFallback>,
}

impl SyncResult {
    /// Backend confirmed the operation.
    #[must_use]
    pub fn completed(performance: PerformanceMetrics) -> Self {
        Self {
            success: true,
            fallback_triggered: false,
            crisis_override_used: false,
            retry_recommended: false,
            error: None,
            performance,
            crisis_fallback: None,
        }
    }

    /// The operation was durably queued for replay. Not a failure: the data
    /// is not lost, merely deferred.
    #[must_use]
    pub fn deferred(error: SyncError, performance: PerformanceMetrics) -> Self {
        Self {
            success: true,
            fallback_triggered: true,
            crisis_override_used: false,
            retry_recommended: true,
            error: Some(error),
            performance,
            crisis_fallback: None,
        }
    }

    /// Admission-time rejection, no transport attempt was made.
    #[must_use]
    pub fn rejected(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            success: false,
            fallback_triggered: false,
            crisis_override_used: false,
            retry_recommended: false,
            error: Some(SyncError::new(kind, message)),
            performance: PerformanceMetrics::default(),
            crisis_fallback: None,
        }
    }

    /// Hard failure: a non-retryable classification.
    #[must_use]
    pub fn failed(error: SyncError, performance: PerformanceMetrics) -> Self {
        Self {
            success: false,
            fallback_triggered: false,
            crisis_override_used: false,
            retry_recommended: false,
            error: Some(error),
            performance,
            crisis_fallback: None,
        }
    }

    /// Crisis request confirmed by the backend within the latency budget.
    #[must_use]
    pub fn crisis_delivered(performance: PerformanceMetrics) -> Self {
        Self {
            crisis_override_used: true,
            ..Self::completed(performance)
        }
    }

    /// Crisis request resolved locally: always a usable success.
    #[must_use]
    pub fn crisis_fallback(fallback: CrisisFallback, performance: PerformanceMetrics) -> Self {
        Self {
            success: true,
            fallback_triggered: true,
            crisis_override_used: true,
            retry_recommended: false,
            error: None,
            performance,
            crisis_fallback: Some(fallback),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completed_shape() {
        let r = SyncResult::completed(PerformanceMetrics {
            total_attempts: 1,
            ..Default::default()
        });
        assert!(r.success);
        assert!(!r.fallback_triggered);
        assert!(r.error.is_none());
        assert_eq!(r.performance.total_attempts, 1);
    }

    #[test]
    fn test_deferred_is_success_with_fallback() {
        let err = SyncError::new(SyncErrorKind::NetworkError, "unreachable");
        let r = SyncResult::deferred(err, PerformanceMetrics::default());
        assert!(r.success);
        assert!(r.fallback_triggered);
        assert!(r.retry_recommended);
        assert_eq!(r.error.unwrap().kind, SyncErrorKind::NetworkError);
    }

    #[test]
    fn test_rejected_is_hard_failure_without_attempts() {
        let r = SyncResult::rejected(SyncErrorKind::DegradationRejected, "level=offline");
        assert!(!r.success);
        assert!(!r.retry_recommended);
        assert_eq!(r.performance.total_attempts, 0);
    }

    #[test]
    fn test_crisis_fallback_is_always_usable() {
        let r = SyncResult::crisis_fallback(
            CrisisFallback::default(),
            PerformanceMetrics::default(),
        );
        assert!(r.success);
        assert!(r.fallback_triggered);
        assert!(r.crisis_override_used);
        assert!(r.crisis_fallback.is_some());
    }
}
