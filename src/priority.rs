// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Priority model: the total order of operation importance.
//!
//! Priority decides two things, in exactly one place each:
//! - circuit-breaker exemption ([`Priority::circuit_exempt`]): the top two
//!   tiers pass through an open breaker,
//! - degradation admission (the table in
//!   [`resilience::degradation`](crate::resilience::degradation)).
//!
//! # Example
//!
//! ```
//! use resilience_engine::Priority;
//!
//! assert!(Priority::CrisisEmergency > Priority::CriticalSafety);
//! assert!(Priority::CriticalSafety.circuit_exempt());
//! assert!(!Priority::HighClinical.circuit_exempt());
//! ```

use serde::{Deserialize, Serialize};

/// Operation importance, lowest first so that derived `Ord` matches the
/// domain order (`CrisisEmergency` is the greatest value).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    /// Background sync: preferences, analytics, non-urgent check-ins.
    LowSync = 0,
    /// User-facing data the user expects to see synced soon.
    MediumUser = 1,
    /// Clinical records and practice outcomes.
    HighClinical = 2,
    /// Safety plans and other data that must survive outages.
    CriticalSafety = 3,
    /// Emergency operations with a hard latency bound.
    CrisisEmergency = 4,
}

impl Priority {
    /// Whether this priority bypasses an open circuit breaker.
    #[must_use]
    pub fn circuit_exempt(self) -> bool {
        matches!(self, Self::CriticalSafety | Self::CrisisEmergency)
    }

    /// Stable string tag (logs and metric labels).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LowSync => "low_sync",
            Self::MediumUser => "medium_user",
            Self::HighClinical => "high_clinical",
            Self::CriticalSafety => "critical_safety",
            Self::CrisisEmergency => "crisis_emergency",
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
