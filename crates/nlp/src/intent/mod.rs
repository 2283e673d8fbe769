pub mod classifier;
pub mod config;

pub use classifier::IntentClassifier;
pub use config::{agent_for_intent, description_for_intent, required_entities};
