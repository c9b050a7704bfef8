//! Transport boundary.
//!
//! The concrete transport (HTTP, websocket, ...) lives outside this crate.
//! Callers hand the engine anything implementing [`Transport`]; the engine
//! only cares about the error classification on the way back.

use async_trait::async_trait;

use crate::error::SyncErrorKind;
use crate::request::SyncRequest;

/// Backend acknowledgment for a delivered request.
#[derive(Debug, Clone, Default)]
pub struct TransportReceipt {
    /// Server-assigned version after applying the operation, if any.
    pub remote_version: Option<u64>,
    /// Opaque confirmation token from the backend.
    pub confirmation: Option<String>,
}

/// Transport-level failure, pre-classified into the engine's taxonomy.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: SyncErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: SyncErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::NetworkError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::TimeoutError, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::RateLimited, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::ServiceUnavailable, message)
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(SyncErrorKind::AuthenticationError, message)
    }
}

impl From<TransportError> for crate::error::SyncError {
    fn from(err: TransportError) -> Self {
        Self::new(err.kind, err.message)
    }
}

/// The opaque delivery callback supplied by the transport layer.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Attempt to deliver one request to the backend.
    ///
    /// The implementation owns its own timeout; the engine bounds crisis
    /// attempts separately with a shorter deadline.
    async fn send(&self, request: &SyncRequest) -> Result<TransportReceipt, TransportError>;
}
