//! Configuration for the resilience engine.
//!
//! # Example
//!
//! ```
//! use resilience_engine::EngineConfig;
//!
//! // Minimal config (uses defaults)
//! let config = EngineConfig::default();
//! assert_eq!(config.recovery.capacity, 1000);
//!
//! // Full config
//! let config = EngineConfig {
//!     recovery: resilience_engine::RecoveryConfig {
//!         capacity: 5000,
//!         queue_path: Some("sync-queue.db".into()),
//!     },
//!     ..Default::default()
//! };
//! assert!(config.validate().is_ok());
//! ```

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::crisis::CrisisConfig;
use crate::resilience::{CircuitBreakerConfig, DegradationConfig, RetryPolicy};

/// Durable queue settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Maximum number of pending operations before eviction kicks in.
    pub capacity: usize,
    /// SQLite file backing the queue. `None` keeps the queue in memory
    /// and loses it on process exit.
    pub queue_path: Option<String>,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            queue_path: None,
        }
    }
}

/// Top-level engine configuration.
///
/// All fields have working defaults; production deployments should at
/// minimum set `recovery.queue_path` so the pending queue survives
/// restarts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub retry: RetryPolicy,
    pub circuit: CircuitBreakerConfig,
    pub degradation: DegradationConfig,
    pub crisis: CrisisConfig,
    pub recovery: RecoveryConfig,
}

/// Configuration validation failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("retry.max_attempts must be at least 1")]
    ZeroMaxAttempts,

    #[error("retry.backoff_multiplier must be at least 1.0, got {0}")]
    BackoffMultiplierTooSmall(f64),

    #[error("circuit.failure_threshold must be at least 1")]
    ZeroFailureThreshold,

    #[error("circuit.success_threshold must be at least 1")]
    ZeroSuccessThreshold,

    #[error("circuit.half_open_max_calls must be at least 1")]
    ZeroHalfOpenCalls,

    #[error("crisis.attempt_timeout must be non-zero")]
    ZeroCrisisTimeout,

    #[error("recovery.capacity must be at least 1")]
    ZeroCapacity,
}

impl EngineConfig {
    /// Reject configurations that would wedge the engine at runtime.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::ZeroMaxAttempts);
        }
        if self.retry.backoff_multiplier < 1.0 {
            return Err(ConfigError::BackoffMultiplierTooSmall(
                self.retry.backoff_multiplier,
            ));
        }
        if self.circuit.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.circuit.success_threshold == 0 {
            return Err(ConfigError::ZeroSuccessThreshold);
        }
        if self.circuit.half_open_max_calls == 0 {
            return Err(ConfigError::ZeroHalfOpenCalls);
        }
        if self.crisis.attempt_timeout.is_zero() {
            return Err(ConfigError::ZeroCrisisTimeout);
        }
        if self.recovery.capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        Ok(())
    }
}
