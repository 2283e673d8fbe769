//! Shared domain types for the hearth conversational core.
//!
//! Everything here is plain data: intents, entities, dialog state, turn
//! results, the service catalog, and the collaborator traits that the
//! surrounding application implements (bookings, complaints, messages).
//! Behaviour lives in the sibling crates.

pub mod catalog;
pub mod collab;
pub mod dialog;
pub mod entity;
pub mod intent;
pub mod message;
pub mod turn;

pub use catalog::{Category, RateCard, ServiceCatalog, Subcategory};
pub use collab::{
    AddressBook, BookingConfirmation, BookingRequest, BookingService, CollabError,
    ComplaintService, ComplaintTicket, MessageStore,
};
pub use dialog::{DialogPhase, DialogState, PendingAction, PendingActionKind};
pub use entity::{Entity, EntityType, ExtractionMethod};
pub use intent::{ClassificationMethod, ClassifiedIntent, Intent, IntentScore};
pub use message::{ConversationMessage, MessageRole};
pub use turn::{ActionTaken, TurnRequest, TurnResult, Utterance};
