//! Turn-level orchestration for the conversational core: the coordinator,
//! the slot-filling loop, the intent handlers, message persistence, and
//! tracing setup. The HTTP layer calls [`Coordinator::process_turn`] once per
//! incoming message and gets a complete [`ChatTurn`] back.

pub mod coordinator;
pub mod handlers;
pub mod history;
pub mod slots;
pub mod telemetry;

pub use coordinator::{ChatTurn, Coordinator, CoordinatorDeps};
pub use handlers::{HandlerKind, IntentHandlers, handler_kind};
pub use history::{JsonlMessageStore, MemoryMessageStore};
pub use slots::SlotFillingOrchestrator;
pub use telemetry::init_tracing;
