//! Injectable time and jitter source.
//!
//! Retry-delay and recovery-timeout logic reads time only through this
//! trait, so unit tests can pin jitter and drive timers deterministically
//! (tokio's paused time handles the sleeps; the trait handles randomness).

use async_trait::async_trait;
use rand::Rng;
use std::time::{Duration, Instant};

/// Monotonic time, suspension, and jitter for the resilience components.
#[async_trait]
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Suspend the current task for `duration`.
    async fn sleep(&self, duration: Duration);

    /// A jitter sample in `[0, max]`.
    fn jitter(&self, max: Duration) -> Duration;
}

/// Production clock: tokio timers plus uniform random jitter.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

#[async_trait]
impl Clock for SystemClock {
    fn now(&self) -> Instant {
        // tokio's instant so paused-time tests see virtual time; identical
        // to `Instant::now()` on a normal runtime.
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn jitter(&self, max: Duration) -> Duration {
        if max.is_zero() {
            return Duration::ZERO;
        }
        let nanos = rand::thread_rng().gen_range(0..=max.as_nanos() as u64);
        Duration::from_nanos(nanos)
    }
}

/// Test clock with a pinned jitter value.
///
/// Sleeps still go through tokio so `#[tokio::test(start_paused = true)]`
/// advances them instantly.
#[derive(Debug, Clone, Copy)]
pub struct FixedJitterClock {
    pub fixed: Duration,
}

impl FixedJitterClock {
    #[must_use]
    pub fn zero() -> Self {
        Self {
            fixed: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Clock for FixedJitterClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    fn jitter(&self, max: Duration) -> Duration {
        self.fixed.min(max)
    }
}
