//! Error taxonomy for sync operations.
//!
//! Every failure that can reach a caller is classified into a
//! [`SyncErrorKind`]. The classification drives three independent decisions:
//! whether the retry controller may reattempt, whether the failure counts
//! toward a circuit breaker trip, and how severely it is reported.

use serde::{Deserialize, Serialize};

/// Reporting severity attached to a [`SyncError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// Classification of a sync failure.
///
/// The first five kinds come from the transport; the remaining kinds are
/// synthetic (no transport attempt was made).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncErrorKind {
    /// Connection-level failure reaching the backend.
    NetworkError,
    /// The transport's own timeout elapsed.
    TimeoutError,
    /// Backend asked us to back off. Retryable with extended backoff.
    RateLimited,
    /// Backend reachable but refusing service. Sustained occurrences are
    /// eligible to trip degradation to `Limited`.
    ServiceUnavailable,
    /// Credentials rejected. Never retried, never a breaker "transient".
    AuthenticationError,
    /// Rejected by the degradation controller before any transport attempt.
    DegradationRejected,
    /// Rejected by an open circuit breaker before any transport attempt.
    CircuitOpenRejected,
    /// Caller cancelled at a retry boundary.
    Cancelled,
}

impl SyncErrorKind {
    /// Whether the retry controller may reattempt this kind at all.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::TimeoutError | Self::RateLimited | Self::ServiceUnavailable
        )
    }

    /// Whether a failure of this kind counts toward tripping a breaker.
    ///
    /// Authentication failures are deliberately excluded: they say nothing
    /// about backend health, and retry-timing must not leak for them.
    #[must_use]
    pub fn counts_toward_breaker(self) -> bool {
        matches!(
            self,
            Self::NetworkError | Self::TimeoutError | Self::RateLimited | Self::ServiceUnavailable
        )
    }

    /// Whether this kind is synthetic (no transport attempt was made).
    #[must_use]
    pub fn is_synthetic(self) -> bool {
        matches!(
            self,
            Self::DegradationRejected | Self::CircuitOpenRejected | Self::Cancelled
        )
    }

    #[must_use]
    pub fn severity(self) -> Severity {
        match self {
            Self::NetworkError | Self::TimeoutError => Severity::Medium,
            Self::RateLimited => Severity::Low,
            Self::ServiceUnavailable => Severity::High,
            Self::AuthenticationError => Severity::High,
            Self::DegradationRejected | Self::CircuitOpenRejected => Severity::Medium,
            Self::Cancelled => Severity::Low,
        }
    }

    /// Stable string tag (used in logs and metric labels).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::NetworkError => "network_error",
            Self::TimeoutError => "timeout_error",
            Self::RateLimited => "rate_limited",
            Self::ServiceUnavailable => "service_unavailable",
            Self::AuthenticationError => "authentication_error",
            Self::DegradationRejected => "degradation_rejected",
            Self::CircuitOpenRejected => "circuit_open_rejected",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for SyncErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured error carried in a [`SyncResult`](crate::result::SyncResult).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
#[error("{kind}: {message}")]
pub struct SyncError {
    pub kind: SyncErrorKind,
    pub message: String,
    pub retryable: bool,
    pub severity: Severity,
}

impl SyncError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retryable: kind.is_retryable(),
            severity: kind.severity(),
        }
    }
}
