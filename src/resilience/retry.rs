// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry decisions with exponential backoff and jitter.
//!
//! The controller is a pure decision function over (error kind, attempt
//! index): either "retry after delay D" or "stop, terminal". Sleeping is
//! the orchestrator's job, through the injected clock, so the schedule is
//! testable without wall-clock waits.
//!
//! delay(n) = min(max_delay, initial_delay × multiplier^(n−1)) + U[0, jitter_max]
//!
//! Crisis requests never enter this controller.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::Clock;
use crate::error::SyncErrorKind;

/// Configuration for retry behavior.
///
/// Numbers here are illustrative defaults, not contract; every field is
/// expected to be tuned per deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total transport attempts, including the first.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    /// Upper bound of the uniform jitter added to each delay.
    pub jitter_max: Duration,
    /// Extra factor applied to the base delay for `rate_limited` failures.
    pub rate_limit_multiplier: f64,
    /// Kinds the controller may retry.
    pub retryable_kinds: Vec<SyncErrorKind>,
    /// Kinds that are terminal on first sight, surfaced immediately.
    pub non_retryable_kinds: Vec<SyncErrorKind>,
    /// Route crisis requests straight to the crisis fast path, bypassing
    /// this policy entirely. When disabled, crisis requests flow through
    /// the ordinary retry loop like any other operation.
    pub crisis_override: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
            jitter_max: Duration::from_millis(100),
            rate_limit_multiplier: 2.0,
            retryable_kinds: vec![
                SyncErrorKind::NetworkError,
                SyncErrorKind::TimeoutError,
                SyncErrorKind::RateLimited,
                SyncErrorKind::ServiceUnavailable,
            ],
            non_retryable_kinds: vec![SyncErrorKind::AuthenticationError],
            crisis_override: true,
        }
    }
}

/// Decision for a single failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reattempt after waiting this long.
    RetryAfter(Duration),
    /// Terminal: no further attempts.
    Stop,
}

/// Computes retry decisions from a [`RetryPolicy`] and the injected clock.
pub struct RetryController {
    policy: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl RetryController {
    pub fn new(policy: RetryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self { policy, clock }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Decide what to do after attempt `attempt` (1-indexed) failed with
    /// `kind`.
    #[must_use]
    pub fn decide(&self, kind: SyncErrorKind, attempt: u32) -> RetryDecision {
        if self.policy.non_retryable_kinds.contains(&kind) {
            return RetryDecision::Stop;
        }
        if !self.policy.retryable_kinds.contains(&kind) {
            return RetryDecision::Stop;
        }
        if attempt >= self.policy.max_attempts {
            return RetryDecision::Stop;
        }

        let base = self.base_delay(kind, attempt);
        RetryDecision::RetryAfter(base + self.clock.jitter(self.policy.jitter_max))
    }

    /// Backoff delay for attempt `attempt`, before jitter.
    #[must_use]
    pub fn base_delay(&self, kind: SyncErrorKind, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let mut base = self
            .policy
            .initial_delay
            .mul_f64(self.policy.backoff_multiplier.powi(exponent));
        if kind == SyncErrorKind::RateLimited {
            base = base.mul_f64(self.policy.rate_limit_multiplier);
        }
        base.min(self.policy.max_delay)
    }
}
