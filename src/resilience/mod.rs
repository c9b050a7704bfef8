// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Resilience primitives: retry policies, per-target circuit breakers,
//! and process-wide degradation control.

pub mod circuit_breaker;
pub mod degradation;
pub mod retry;

pub use circuit_breaker::{
    Admission, CircuitBreaker, CircuitBreakerConfig, CircuitSnapshot, CircuitState, TargetCircuits,
};
pub use degradation::{DegradationConfig, DegradationController, DegradationLevel};
pub use retry::{RetryController, RetryDecision, RetryPolicy};
