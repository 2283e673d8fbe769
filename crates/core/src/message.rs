use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::intent::Intent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }
}

/// One persisted conversation message, user or assistant, with the turn
/// metadata the ops review screens read back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub id: Uuid,
    pub session_id: String,
    pub user_id: i64,
    pub role: MessageRole,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intent: Option<Intent>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_used: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    pub created_at: DateTime<Utc>,
}

impl ConversationMessage {
    pub fn user(user_id: i64, session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            session_id: session_id.into(),
            user_id,
            role: MessageRole::User,
            text: text.into(),
            intent: None,
            confidence: None,
            agent_used: None,
            response_time_ms: None,
            created_at: Utc::now(),
        }
    }

    pub fn assistant(user_id: i64, session_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            ..Self::user(user_id, session_id, text)
        }
    }
}
