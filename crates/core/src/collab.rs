//! Collaborator traits: the services that own business entities.
//!
//! The core never writes bookings, complaints or messages itself; handlers
//! receive these capabilities by parameter and call through them. The
//! surrounding application wires real implementations; tests wire in-memory
//! ones.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::message::ConversationMessage;

#[derive(Debug, Error)]
pub enum CollabError {
    /// The collaborator is down or unreachable; the turn degrades gracefully.
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingRequest {
    pub user_id: i64,
    pub session_id: String,
    pub category_id: i64,
    pub subcategory_id: i64,
    pub rate_card_id: i64,
    /// ISO `YYYY-MM-DD`.
    pub date: String,
    /// `HH:MM`, 24-hour.
    pub time: String,
    #[serde(default)]
    pub pincode: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookingConfirmation {
    pub booking_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComplaintTicket {
    pub ticket_id: String,
}

#[async_trait]
pub trait BookingService: Send + Sync {
    async fn booking_exists(&self, booking_id: &str) -> Result<bool, CollabError>;
    async fn create_booking(&self, request: BookingRequest)
    -> Result<BookingConfirmation, CollabError>;
    async fn cancel_booking(&self, user_id: i64, booking_id: &str) -> Result<(), CollabError>;
    async fn request_refund(
        &self,
        user_id: i64,
        booking_id: &str,
        reason: &str,
    ) -> Result<(), CollabError>;
}

#[async_trait]
pub trait ComplaintService: Send + Sync {
    async fn file_complaint(
        &self,
        user_id: i64,
        session_id: &str,
        issue_type: &str,
        description: &str,
    ) -> Result<ComplaintTicket, CollabError>;
}

/// Saved addresses; used to auto-fill LOCATION during slot filling.
#[async_trait]
pub trait AddressBook: Send + Sync {
    async fn default_pincode(&self, user_id: i64) -> Result<Option<String>, CollabError>;
}

#[async_trait]
pub trait MessageStore: Send + Sync {
    async fn append(&self, message: ConversationMessage) -> Result<(), CollabError>;
    /// Most recent messages for a session, oldest first, capped at `limit`.
    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, CollabError>;
}
