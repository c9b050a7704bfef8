// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Crisis fast path.
//!
//! A dedicated, minimal-dependency execution path for emergency operations.
//! It makes at most one best-effort remote attempt under a short timeout and
//! otherwise synthesizes a local fallback result carrying offline emergency
//! resources. It never consults the circuit breaker, the degradation
//! controller, or the retry controller, and it shares no locks with them:
//! a tripped breaker or offline mode must never delay a crisis answer.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::request::SyncRequest;
use crate::result::{PerformanceMetrics, SyncResult};
use crate::transport::Transport;

/// Locally known emergency resources, renderable with zero network calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrisisFallback {
    /// Crisis hotline identifier (dialable without app connectivity).
    pub hotline: String,
    /// An offline copy of the user's safety plan is available on device.
    pub offline_safety_plan_available: bool,
    /// The app is serving crisis support from local resources.
    pub offline_support_active: bool,
}

impl Default for CrisisFallback {
    fn default() -> Self {
        Self {
            hotline: default_hotline(),
            offline_safety_plan_available: true,
            offline_support_active: true,
        }
    }
}

/// Configuration for the crisis fast path.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrisisConfig {
    /// Deadline for the single best-effort remote attempt.
    pub attempt_timeout: Duration,
    /// Hotline identifier embedded in fallback results.
    pub hotline: String,
}

impl Default for CrisisConfig {
    fn default() -> Self {
        Self {
            attempt_timeout: Duration::from_millis(150),
            hotline: default_hotline(),
        }
    }
}

fn default_hotline() -> String {
    "988".to_string()
}

/// Executes crisis operations within the crisis latency budget.
pub struct CrisisResponder {
    config: CrisisConfig,
    clock: Arc<dyn Clock>,
}

impl CrisisResponder {
    #[must_use]
    pub fn new(config: CrisisConfig, clock: Arc<dyn Clock>) -> Self {
        Self { config, clock }
    }

    /// Handle a crisis operation.
    ///
    /// Always returns a usable result: either the backend's confirmation or
    /// a local fallback. Never returns a failure state.
    #[tracing::instrument(skip(self, request, transport), fields(operation_id = %request.operation_id))]
    pub async fn handle(&self, request: &SyncRequest, transport: &dyn Transport) -> SyncResult {
        let started = self.clock.now();

        match tokio::time::timeout(self.config.attempt_timeout, transport.send(request)).await {
            Ok(Ok(_receipt)) => {
                debug!("Crisis operation delivered remotely");
                crate::metrics::record_crisis("delivered", self.elapsed(started));
                SyncResult::crisis_delivered(self.performance(started))
            }
            Ok(Err(err)) => {
                warn!(error = %err, "Crisis transport failed, serving local fallback");
                crate::metrics::record_crisis("fallback", self.elapsed(started));
                SyncResult::crisis_fallback(self.fallback(), self.performance(started))
            }
            Err(_) => {
                warn!(
                    timeout_ms = self.config.attempt_timeout.as_millis() as u64,
                    "Crisis transport timed out, serving local fallback"
                );
                crate::metrics::record_crisis("fallback", self.elapsed(started));
                SyncResult::crisis_fallback(self.fallback(), self.performance(started))
            }
        }
    }

    fn elapsed(&self, started: Instant) -> Duration {
        self.clock.now().duration_since(started)
    }

    fn fallback(&self) -> CrisisFallback {
        CrisisFallback {
            hotline: self.config.hotline.clone(),
            offline_safety_plan_available: true,
            offline_support_active: true,
        }
    }

    fn performance(&self, started: Instant) -> PerformanceMetrics {
        PerformanceMetrics {
            total_attempts: 1,
            total_elapsed: self.elapsed(started),
            queue_wait: Duration::ZERO,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::priority::Priority;
    use crate::transport::{TransportError, TransportReceipt};
    use async_trait::async_trait;

    struct OkTransport;

    #[async_trait]
    impl Transport for OkTransport {
        async fn send(&self, _request: &SyncRequest) -> Result<TransportReceipt, TransportError> {
            Ok(TransportReceipt::default())
        }
    }

    struct FailingTransport;

    #[async_trait]
    impl Transport for FailingTransport {
        async fn send(&self, _request: &SyncRequest) -> Result<TransportReceipt, TransportError> {
            Err(TransportError::network("backend unreachable"))
        }
    }

    struct HangingTransport;

    #[async_trait]
    impl Transport for HangingTransport {
        async fn send(&self, _request: &SyncRequest) -> Result<TransportReceipt, TransportError> {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(TransportReceipt::default())
        }
    }

    fn crisis_request() -> SyncRequest {
        SyncRequest::new(
            "crisis-1".to_string(),
            Priority::CrisisEmergency,
            "safety_plan",
            "plan-1",
            vec![0xde, 0xad],
        )
        .crisis_flagged()
    }

    #[tokio::test]
    async fn test_remote_delivery_reported_as_override() {
        let responder = CrisisResponder::new(CrisisConfig::default(), Arc::new(SystemClock));
        let result = responder.handle(&crisis_request(), &OkTransport).await;

        assert!(result.success);
        assert!(result.crisis_override_used);
        assert!(!result.fallback_triggered);
        assert!(result.crisis_fallback.is_none());
        assert_eq!(result.performance.total_attempts, 1);
    }

    #[tokio::test]
    async fn test_transport_failure_yields_fallback_success() {
        let responder = CrisisResponder::new(CrisisConfig::default(), Arc::new(SystemClock));
        let result = responder.handle(&crisis_request(), &FailingTransport).await;

        assert!(result.success);
        assert!(result.fallback_triggered);
        let fallback = result.crisis_fallback.unwrap();
        assert_eq!(fallback.hotline, "988");
        assert!(fallback.offline_safety_plan_available);
        assert!(fallback.offline_support_active);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_transport_bounded_by_timeout() {
        let responder = CrisisResponder::new(CrisisConfig::default(), Arc::new(SystemClock));
        let start = tokio::time::Instant::now();
        let result = responder.handle(&crisis_request(), &HangingTransport).await;

        // Paused time: the only timer that fired is the 150ms attempt timeout,
        // and the reported elapsed time is measured on the same virtual clock.
        assert_eq!(start.elapsed(), Duration::from_millis(150));
        assert_eq!(result.performance.total_elapsed, Duration::from_millis(150));
        assert!(result.success);
        assert!(result.fallback_triggered);
    }

    #[tokio::test]
    async fn test_custom_hotline_carried_into_fallback() {
        let responder = CrisisResponder::new(
            CrisisConfig {
                hotline: "116 123".to_string(),
                ..CrisisConfig::default()
            },
            Arc::new(SystemClock),
        );
        let result = responder.handle(&crisis_request(), &FailingTransport).await;
        assert_eq!(result.crisis_fallback.unwrap().hotline, "116 123");
    }
}
