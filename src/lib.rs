//! # Resilience Engine
//!
//! A priority-aware sync resilience engine for clients that must keep
//! working through flaky networks and degraded backends.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      SyncOrchestrator                       │
//! │  • execute_resilient_sync() per operation                  │
//! │  • Crisis requests short-circuit to the fast path          │
//! └─────────────────────────────────────────────────────────────┘
//!          │                    │                    │
//!          ▼                    ▼                    ▼
//! ┌────────────────┐  ┌──────────────────┐  ┌─────────────────┐
//! │  Degradation   │  │ Circuit Breakers │  │  Crisis Fast    │
//! │  Controller    │  │  (per target)    │  │  Path (≤150ms)  │
//! │  admit/reject  │  │  trip/half-open  │  │  local fallback │
//! └────────────────┘  └──────────────────┘  └─────────────────┘
//!          │                    │
//!          ▼                    ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │               Retry (exponential + jitter)                  │
//! └─────────────────────────────────────────────────────────────┘
//!                              │ (budget exhausted / circuit open)
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │       RecoveryStore (SQLite queue, bounded, replayed)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use resilience_engine::{
//!     EngineConfig, Priority, SyncOrchestrator, SyncRequest, Transport,
//!     TransportError, TransportReceipt,
//! };
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct HttpTransport;
//!
//! #[async_trait]
//! impl Transport for HttpTransport {
//!     async fn send(&self, request: &SyncRequest) -> Result<TransportReceipt, TransportError> {
//!         // POST request.payload to the backend...
//!         Ok(TransportReceipt::default())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     let engine = SyncOrchestrator::new(EngineConfig::default(), Arc::new(HttpTransport))
//!         .await
//!         .expect("engine startup");
//!
//!     let request = SyncRequest::new(
//!         "op-1".into(),
//!         Priority::HighClinical,
//!         "mood_checkin",
//!         "checkin-42",
//!         b"ciphertext".to_vec(),
//!     );
//!
//!     let result = engine.execute_resilient_sync(request).await;
//!     assert!(result.success || result.error.is_some());
//!
//!     // Later, when connectivity returns:
//!     let summary = engine.recover_all().await.expect("replay");
//!     println!("replayed {} operations", summary.recovered);
//! }
//! ```
//!
//! ## Failure semantics
//!
//! The engine never loses data for retryable failures. The only hard
//! failures callers see are non-retryable classifications (authentication,
//! cancellation) and admission-time rejections; every other outcome is a
//! confirmed delivery or a durable deferral reported as
//! success-with-fallback. Crisis operations always succeed, remotely
//! within the latency budget or locally via [`CrisisFallback`].
//!
//! ## Modules
//!
//! - [`orchestrator`]: the [`SyncOrchestrator`] tying everything together
//! - [`resilience`]: retry, circuit breakers, degradation control
//! - [`store`]: durable queue backends and the recovery policy layer
//! - [`crisis`]: the crisis fast path
//! - [`transport`]: the delivery seam implemented by callers

pub mod clock;
pub mod config;
pub mod crisis;
pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod priority;
pub mod request;
pub mod resilience;
pub mod result;
pub mod store;
pub mod transport;

pub use clock::{Clock, FixedJitterClock, SystemClock};
pub use config::{ConfigError, EngineConfig, RecoveryConfig};
pub use crisis::{CrisisConfig, CrisisFallback, CrisisResponder};
pub use error::{Severity, SyncError, SyncErrorKind};
pub use orchestrator::{EngineError, EngineStats, HealthClassification, SyncOrchestrator};
pub use priority::Priority;
pub use request::{PayloadMetadata, PersistedOperation, SubscriptionTier, SyncRequest};
pub use resilience::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState,
    DegradationConfig, DegradationController, DegradationLevel, RetryController, RetryDecision,
    RetryPolicy, TargetCircuits,
};
pub use result::{PerformanceMetrics, SyncResult};
pub use store::{
    InMemoryQueue, PendingCounts, PersistOutcome, QueueStore, RecoveryStore, RecoverySummary,
    SqliteQueue, StoreError,
};
pub use transport::{Transport, TransportError, TransportReceipt};
