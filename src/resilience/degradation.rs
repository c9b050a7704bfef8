// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Process-wide service degradation control.
//!
//! A single, explicit, inspectable knob for "how much non-critical traffic
//! should we allow". Health checks (external to this crate) drive it
//! through [`DegradationController::set_level`]; sustained
//! `service_unavailable` failures can also trip it to `Limited`.
//!
//! Admission is a pure function of the table below; all priority-based
//! permission decisions live here and nowhere else:
//!
//! | Level   | Admitted priorities                    |
//! |---------|----------------------------------------|
//! | Normal  | all                                    |
//! | Limited | `MediumUser` and above                 |
//! | Offline | `CriticalSafety` and above             |
//!
//! `CrisisEmergency` is admitted at every level, by construction.

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info};

use crate::priority::Priority;

/// Coarse, explicitly set indicator of backend health.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    Normal = 0,
    Limited = 1,
    Offline = 2,
}

impl DegradationLevel {
    /// Table-driven admission predicate.
    #[must_use]
    pub fn admits(self, priority: Priority) -> bool {
        match self {
            Self::Normal => true,
            Self::Limited => priority >= Priority::MediumUser,
            Self::Offline => priority >= Priority::CriticalSafety,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Normal => "normal",
            Self::Limited => "limited",
            Self::Offline => "offline",
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for the degradation controller.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DegradationConfig {
    /// Consecutive `service_unavailable` failures that auto-trip
    /// Normal → Limited. Zero disables the auto-trip.
    pub auto_limit_threshold: u32,
}

impl Default for DegradationConfig {
    fn default() -> Self {
        Self {
            auto_limit_threshold: 5,
        }
    }
}

/// Holds the process-wide degradation level.
///
/// Reads on the request hot path take one `RwLock` read; there is no other
/// hidden state.
pub struct DegradationController {
    level: RwLock<DegradationLevel>,
    unavailable_streak: AtomicU32,
    config: DegradationConfig,
}

impl DegradationController {
    #[must_use]
    pub fn new(config: DegradationConfig) -> Self {
        Self {
            level: RwLock::new(DegradationLevel::Normal),
            unavailable_streak: AtomicU32::new(0),
            config,
        }
    }

    #[must_use]
    pub fn level(&self) -> DegradationLevel {
        *self.level.read()
    }

    /// Set the level explicitly. Idempotent; every real transition is
    /// logged with its reason.
    pub fn set_level(&self, level: DegradationLevel, reason: &str) {
        let mut current = self.level.write();
        if *current == level {
            debug!(level = %level, reason, "Degradation level unchanged");
            return;
        }
        info!(from = %*current, to = %level, reason, "Degradation level changed");
        *current = level;
        crate::metrics::set_degradation_level(level as u8);
        crate::metrics::record_degradation_change(level.as_str());
    }

    /// Whether a request of this priority may proceed at the current level.
    #[must_use]
    pub fn is_admitted(&self, priority: Priority) -> bool {
        if priority == Priority::CrisisEmergency {
            return true;
        }
        self.level().admits(priority)
    }

    /// Note a `service_unavailable` failure. Sustained streaks trip
    /// Normal → Limited.
    pub fn record_unavailable(&self) {
        let streak = self.unavailable_streak.fetch_add(1, Ordering::AcqRel) + 1;
        let threshold = self.config.auto_limit_threshold;
        if threshold > 0 && streak >= threshold && self.level() == DegradationLevel::Normal {
            self.set_level(
                DegradationLevel::Limited,
                "sustained service_unavailable failures",
            );
        }
    }

    /// Note a successful transport call, resetting the failure streak.
    pub fn record_healthy(&self) {
        self.unavailable_streak.store(0, Ordering::Release);
    }

    #[must_use]
    pub fn unavailable_streak(&self) -> u32 {
        self.unavailable_streak.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admission_table() {
        let all = [
            Priority::LowSync,
            Priority::MediumUser,
            Priority::HighClinical,
            Priority::CriticalSafety,
            Priority::CrisisEmergency,
        ];

        for p in all {
            assert!(DegradationLevel::Normal.admits(p));
        }

        assert!(!DegradationLevel::Limited.admits(Priority::LowSync));
        assert!(DegradationLevel::Limited.admits(Priority::MediumUser));
        assert!(DegradationLevel::Limited.admits(Priority::HighClinical));
        assert!(DegradationLevel::Limited.admits(Priority::CriticalSafety));

        assert!(!DegradationLevel::Offline.admits(Priority::LowSync));
        assert!(!DegradationLevel::Offline.admits(Priority::MediumUser));
        assert!(!DegradationLevel::Offline.admits(Priority::HighClinical));
        assert!(DegradationLevel::Offline.admits(Priority::CriticalSafety));
        assert!(DegradationLevel::Offline.admits(Priority::CrisisEmergency));
    }

    #[test]
    fn test_starts_normal() {
        let ctl = DegradationController::new(DegradationConfig::default());
        assert_eq!(ctl.level(), DegradationLevel::Normal);
        assert!(ctl.is_admitted(Priority::LowSync));
    }

    #[test]
    fn test_set_level_is_idempotent() {
        let ctl = DegradationController::new(DegradationConfig::default());
        ctl.set_level(DegradationLevel::Limited, "operator request");
        ctl.set_level(DegradationLevel::Limited, "operator request again");
        assert_eq!(ctl.level(), DegradationLevel::Limited);
        assert!(!ctl.is_admitted(Priority::LowSync));
        assert!(ctl.is_admitted(Priority::MediumUser));
    }

    #[test]
    fn test_crisis_admitted_at_every_level() {
        let ctl = DegradationController::new(DegradationConfig::default());
        for level in [
            DegradationLevel::Normal,
            DegradationLevel::Limited,
            DegradationLevel::Offline,
        ] {
            ctl.set_level(level, "test");
            assert!(ctl.is_admitted(Priority::CrisisEmergency));
        }
    }

    #[test]
    fn test_sustained_unavailable_trips_limited() {
        let ctl = DegradationController::new(DegradationConfig {
            auto_limit_threshold: 3,
        });

        ctl.record_unavailable();
        ctl.record_unavailable();
        assert_eq!(ctl.level(), DegradationLevel::Normal);

        ctl.record_unavailable();
        assert_eq!(ctl.level(), DegradationLevel::Limited);
    }

    #[test]
    fn test_success_resets_streak() {
        let ctl = DegradationController::new(DegradationConfig {
            auto_limit_threshold: 3,
        });

        ctl.record_unavailable();
        ctl.record_unavailable();
        ctl.record_healthy();
        assert_eq!(ctl.unavailable_streak(), 0);

        ctl.record_unavailable();
        assert_eq!(ctl.level(), DegradationLevel::Normal);
    }

    #[test]
    fn test_auto_trip_disabled_with_zero_threshold() {
        let ctl = DegradationController::new(DegradationConfig {
            auto_limit_threshold: 0,
        });
        for _ in 0..100 {
            ctl.record_unavailable();
        }
        assert_eq!(ctl.level(), DegradationLevel::Normal);
    }

    #[test]
    fn test_auto_trip_does_not_downgrade_offline() {
        let ctl = DegradationController::new(DegradationConfig {
            auto_limit_threshold: 1,
        });
        ctl.set_level(DegradationLevel::Offline, "maintenance window");
        ctl.record_unavailable();
        assert_eq!(ctl.level(), DegradationLevel::Offline);
    }
}
