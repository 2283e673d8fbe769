//! Natural-language understanding for the conversational core: two-tier
//! intent classification, hybrid entity extraction, domain validation, and
//! clarifying-question generation.

pub mod extract;
pub mod intent;
pub mod question;
pub mod validate;

pub use extract::{EntityExtractor, ExtractionContext, ResolvedService};
pub use intent::{IntentClassifier, agent_for_intent, description_for_intent, required_entities};
pub use question::{QuestionContext, QuestionGenerator};
pub use validate::{EntityValidator, ValidationContext, ValidationOutcome};
