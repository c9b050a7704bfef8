//! Sync request data structures.
//!
//! A [`SyncRequest`] is the immutable unit of work flowing through the
//! engine. The payload is opaque here: it has already been encrypted and
//! serialized by the caller, and the engine only moves it.

use serde::{Deserialize, Serialize};

use crate::priority::Priority;

/// Subscription tier context carried on each request.
///
/// Supplied by the caller's classification logic; the engine does not
/// compute it, it only carries it for logging and downstream policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Premium,
    Clinical,
}

/// Metadata describing the entity a payload belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMetadata {
    /// Logical backend resource this entity lives under. Also the circuit
    /// breaker key: breaker state is per entity type, never global.
    pub entity_type: String,
    pub entity_id: String,
    /// Monotonically increasing version within this entity.
    pub version: u64,
    /// Last-modified timestamp (epoch millis).
    pub last_modified: i64,
    /// Integrity checksum computed by the caller over the payload.
    pub checksum: String,
    /// Originating device.
    pub device_id: String,
    /// Owning user.
    pub user_id: String,
}

/// One unit of sync work.
///
/// Invariant: `operation_id` is globally unique for the lifetime of any
/// persisted queue entry. Reusing an id for a new logical operation is
/// undefined.
///
/// # Example
///
/// ```
/// use resilience_engine::{Priority, SyncRequest};
///
/// let request = SyncRequest::new(
///     "op-2041".into(),
///     Priority::HighClinical,
///     "mood_checkin",
///     "checkin-77",
///     b"ciphertext".to_vec(),
/// );
///
/// assert_eq!(request.metadata.entity_type, "mood_checkin");
/// assert!(!request.crisis);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// Globally unique operation identifier.
    pub operation_id: String,
    pub priority: Priority,
    /// Opaque payload, already encrypted/serialized upstream.
    pub payload: Vec<u8>,
    pub metadata: PayloadMetadata,
    /// Conflict-resolution policy tag, understood by the caller only.
    pub conflict_policy: String,
    /// Routes the request through the crisis fast path.
    pub crisis: bool,
    pub tier: SubscriptionTier,
}

impl SyncRequest {
    /// Create a request with minimal required fields.
    pub fn new(
        operation_id: String,
        priority: Priority,
        entity_type: impl Into<String>,
        entity_id: impl Into<String>,
        payload: Vec<u8>,
    ) -> Self {
        Self {
            operation_id,
            priority,
            payload,
            metadata: PayloadMetadata {
                entity_type: entity_type.into(),
                entity_id: entity_id.into(),
                version: 1,
                last_modified: epoch_millis(),
                checksum: String::new(),
                device_id: String::new(),
                user_id: String::new(),
            },
            conflict_policy: "last_write_wins".to_string(),
            crisis: false,
            tier: SubscriptionTier::default(),
        }
    }

    /// Mark this request as a crisis operation.
    #[must_use]
    pub fn crisis_flagged(mut self) -> Self {
        self.crisis = true;
        self.priority = Priority::CrisisEmergency;
        self
    }

    #[must_use]
    pub fn with_tier(mut self, tier: SubscriptionTier) -> Self {
        self.tier = tier;
        self
    }
}

fn epoch_millis() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}

/// A request plus the bookkeeping needed for durable replay.
///
/// Created when live delivery is not currently possible; destroyed on
/// confirmed successful replay; never silently dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedOperation {
    pub request: SyncRequest,
    /// Enqueue timestamp (epoch millis). Replay is FIFO within a priority.
    pub enqueued_at: i64,
    /// Attempts made since the record was enqueued.
    pub attempts: u32,
    /// Summary of the most recent delivery failure.
    pub last_error: Option<String>,
    /// Crisis-class records replay ahead of everything else and are never
    /// eviction victims while lower-priority records exist.
    pub crisis_class: bool,
}

impl PersistedOperation {
    pub fn new(request: SyncRequest, last_error: Option<String>) -> Self {
        let crisis_class = request.crisis || request.priority >= Priority::CriticalSafety;
        Self {
            request,
            enqueued_at: epoch_millis(),
            attempts: 0,
            last_error,
            crisis_class,
        }
    }
}
