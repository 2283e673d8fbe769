use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::intent::Intent;

/// Immutable input to every turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub session_id: String,
    pub user_id: i64,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(user_id: i64, session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// What the HTTP layer hands to the core for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnRequest {
    pub user_id: i64,
    #[serde(default)]
    pub session_id: Option<String>,
    pub text: String,
    #[serde(default)]
    pub channel: Option<String>,
}

/// Closed set of actions a turn can report having taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    None,
    AskedQuestion,
    RequestedConfirmation,
    CreatedBooking,
    CancelledBooking,
    FiledComplaint,
    RequestedRefund,
    AnsweredPolicy,
    ListedServices,
    Escalated,
}

impl ActionTaken {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionTaken::None => "none",
            ActionTaken::AskedQuestion => "asked_question",
            ActionTaken::RequestedConfirmation => "requested_confirmation",
            ActionTaken::CreatedBooking => "created_booking",
            ActionTaken::CancelledBooking => "cancelled_booking",
            ActionTaken::FiledComplaint => "filed_complaint",
            ActionTaken::RequestedRefund => "requested_refund",
            ActionTaken::AnsweredPolicy => "answered_policy",
            ActionTaken::ListedServices => "listed_services",
            ActionTaken::Escalated => "escalated",
        }
    }
}

/// What a handler (or the coordinator itself) returns for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TurnResult {
    pub response_text: String,
    pub intent: Intent,
    pub confidence: f32,
    pub agent_used: String,
    pub action_taken: ActionTaken,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl TurnResult {
    pub fn new(
        response_text: impl Into<String>,
        intent: Intent,
        confidence: f32,
        agent_used: impl Into<String>,
        action_taken: ActionTaken,
    ) -> Self {
        Self {
            response_text: response_text.into(),
            intent,
            confidence,
            agent_used: agent_used.into(),
            action_taken,
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}
