//! Dialog state management: one slot-filling record per session.
//!
//! The manager owns every mutation of [`hearth_core::DialogState`] and the
//! follow-up heuristics the coordinator consults before classification.
//! Storage is behind [`DialogStore`]; the in-memory implementation serves
//! tests and single-process deployments, the SQL row shape mirrors the
//! struct field-for-field.

pub mod followup;
pub mod manager;
pub mod store;

pub use followup::FollowUpDetection;
pub use manager::{DialogStateManager, DialogStateStatus, DialogStateUpdate};
pub use store::{DialogStore, MemoryDialogStore};
