//! Dialog state: the per-session slot-filling record.
//!
//! One active state per session. Invariants enforced by the manager in
//! `hearth-dialog`:
//! * phase `AwaitingConfirmation` ⇒ `pending_action` is present;
//! * `needs_more_info()` ⇔ phase `CollectingInfo` and `needed_entities`
//!   non-empty;
//! * phase `Idle`/`Completed` or `now > expires_at` ⇒ inactive.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::EntityType;
use crate::intent::Intent;

pub const DEFAULT_EXPIRY_HOURS: i64 = 24;
pub const MIN_EXPIRY_HOURS: i64 = 1;
pub const MAX_EXPIRY_HOURS: i64 = 168;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DialogPhase {
    Idle,
    CollectingInfo,
    AwaitingConfirmation,
    ExecutingAction,
    Completed,
    Error,
}

impl DialogPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogPhase::Idle => "idle",
            DialogPhase::CollectingInfo => "collecting_info",
            DialogPhase::AwaitingConfirmation => "awaiting_confirmation",
            DialogPhase::ExecutingAction => "executing_action",
            DialogPhase::Completed => "completed",
            DialogPhase::Error => "error",
        }
    }
}

/// Operation awaiting user confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingActionKind {
    CreateBooking,
    CancelBooking,
    FileComplaint,
    RequestRefund,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingAction {
    pub kind: PendingActionKind,
    pub params: serde_json::Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogState {
    pub session_id: String,
    pub user_id: i64,
    pub phase: DialogPhase,
    pub intent: Option<Intent>,
    /// Normalized entity values keyed by entity-type label.
    pub collected_entities: HashMap<String, serde_json::Value>,
    /// Auxiliary identifiers (rate_card_id, subcategory_id, …) kept apart
    /// from the entity map. Readers still tolerate legacy `_metadata_*` keys
    /// inside `collected_entities`; see [`DialogState::metadata_value`].
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    /// Slots still to fill, in the order they will be asked.
    pub needed_entities: Vec<EntityType>,
    pub pending_action: Option<PendingAction>,
    /// Free-form turn bookkeeping: `last_question`, `attempt_count`,
    /// `available_subcategories`.
    #[serde(default)]
    pub context: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl DialogState {
    pub fn new(user_id: i64, session_id: impl Into<String>, expires_in_hours: i64) -> Self {
        let now = Utc::now();
        let hours = expires_in_hours.clamp(MIN_EXPIRY_HOURS, MAX_EXPIRY_HOURS);
        Self {
            session_id: session_id.into(),
            user_id,
            phase: DialogPhase::Idle,
            intent: None,
            collected_entities: HashMap::new(),
            metadata: HashMap::new(),
            needed_entities: Vec::new(),
            pending_action: None,
            context: HashMap::new(),
            created_at: now,
            updated_at: now,
            expires_at: now + Duration::hours(hours),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_expired(now)
            && !matches!(self.phase, DialogPhase::Idle | DialogPhase::Completed)
    }

    pub fn needs_more_info(&self) -> bool {
        self.phase == DialogPhase::CollectingInfo && !self.needed_entities.is_empty()
    }

    /// The slot the next user message is expected to answer.
    pub fn expected_entity(&self) -> Option<EntityType> {
        if self.phase == DialogPhase::CollectingInfo {
            self.needed_entities.first().copied()
        } else {
            None
        }
    }

    /// Look up an auxiliary identifier, preferring the dedicated metadata map
    /// but falling back to a `_metadata_<key>` entry left in
    /// `collected_entities` by older writers.
    pub fn metadata_value(&self, key: &str) -> Option<&serde_json::Value> {
        self.metadata
            .get(key)
            .or_else(|| self.collected_entities.get(&format!("_metadata_{key}")))
    }

    pub fn attempt_count(&self) -> u32 {
        self.context
            .get("attempt_count")
            .and_then(|value| value.as_u64())
            .unwrap_or(0) as u32
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
