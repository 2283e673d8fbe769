//! Follow-up detection: is this message continuing the in-progress intent,
//! or starting a new one?
//!
//! Cheap heuristics run first; anything ambiguous defers to the
//! context-aware classifier.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use hearth_core::{DialogPhase, DialogState, EntityType};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FollowUpDetection {
    pub is_follow_up: bool,
    pub confidence: f32,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_entity: Option<EntityType>,
}

static CONFIRMATION_TOKENS: &[&str] = &[
    "yes", "no", "yeah", "yep", "nope", "ok", "okay", "sure", "confirm", "cancel", "correct",
];

static ACTION_VERBS: &[&str] = &["book", "cancel", "reschedule", "complain", "refund"];

static DATE_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(today|tomorrow|\d{4}-\d{2}-\d{2}|\d{1,2}[/-]\d{1,2}(?:[/-]\d{2,4})?|(?:next\s+)?(?:mon|tues|wednes|thurs|fri|satur|sun)day)$").unwrap()
});
static TIME_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\d{1,2}(?::\d{2})?\s*(?:am|pm)?$").unwrap()
});
static PINCODE_SHAPE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{6}$").unwrap());
static BOOKING_ID_SHAPE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ORD[A-Z0-9]{8}$").unwrap());
static NUMERIC_CHOICE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,2}$").unwrap());

/// Rough shape check for a short answer against the slot we asked about.
/// Full extraction happens later; this only gates the follow-up decision.
fn matches_expected_shape(text: &str, expected: EntityType) -> bool {
    let trimmed = text.trim();
    match expected {
        EntityType::Date => DATE_SHAPE.is_match(trimmed),
        EntityType::Time => TIME_SHAPE.is_match(trimmed),
        EntityType::Location => PINCODE_SHAPE.is_match(trimmed),
        EntityType::BookingId => BOOKING_ID_SHAPE.is_match(&trimmed.to_uppercase()),
        // A subcategory answer is a numbered pick or a short name.
        EntityType::ServiceSubcategory => {
            NUMERIC_CHOICE.is_match(trimmed) || trimmed.chars().any(|c| c.is_alphabetic())
        }
        // Any short text can name a service, an issue, or a payment mode.
        EntityType::ServiceType
        | EntityType::IssueType
        | EntityType::PaymentType
        | EntityType::Action
        | EntityType::Query => trimmed.chars().any(|c| c.is_alphanumeric()),
    }
}

fn token_count(text: &str) -> usize {
    text.split_whitespace().count()
}

fn starts_with_action_verb(text: &str) -> Option<&'static str> {
    let lowered = text.trim().to_lowercase();
    ACTION_VERBS
        .iter()
        .find(|verb| {
            lowered.starts_with(&format!("{verb} "))
                || lowered.starts_with(&format!("i want to {verb}"))
                || lowered.starts_with(&format!("please {verb}"))
        })
        .copied()
}

/// Decide whether `text` continues `state`'s intent.
pub fn detect_follow_up(text: &str, state: Option<&DialogState>) -> FollowUpDetection {
    let Some(state) = state else {
        return FollowUpDetection {
            is_follow_up: false,
            confidence: 0.9,
            reason: "no active dialog state".to_string(),
            expected_entity: None,
        };
    };

    let tokens = token_count(text);
    let lowered = text.trim().to_lowercase();

    if state.phase == DialogPhase::AwaitingConfirmation
        && tokens < 5
        && lowered
            .split(|c: char| !c.is_alphanumeric())
            .any(|word| CONFIRMATION_TOKENS.contains(&word))
    {
        return FollowUpDetection {
            is_follow_up: true,
            confidence: 0.95,
            reason: "awaiting confirmation and message is a short confirmation/denial".to_string(),
            expected_entity: None,
        };
    }

    if state.phase == DialogPhase::CollectingInfo && tokens <= 3 {
        if let Some(expected) = state.expected_entity() {
            if matches_expected_shape(text, expected) {
                return FollowUpDetection {
                    is_follow_up: true,
                    confidence: 0.9,
                    reason: format!(
                        "short message matches expected entity type ({})",
                        expected.as_str()
                    ),
                    expected_entity: Some(expected),
                };
            }
        }
    }

    if tokens > 8 {
        return FollowUpDetection {
            is_follow_up: false,
            confidence: 0.85,
            reason: "long message, likely a new request".to_string(),
            expected_entity: None,
        };
    }
    if let Some(verb) = starts_with_action_verb(text) {
        return FollowUpDetection {
            is_follow_up: false,
            confidence: 0.85,
            reason: format!("message starts a new '{verb}' action"),
            expected_entity: None,
        };
    }

    FollowUpDetection {
        is_follow_up: false,
        confidence: 0.5,
        reason: "ambiguous, deferred to context-aware classifier".to_string(),
        expected_entity: state.expected_entity(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::Intent;

    fn state(phase: DialogPhase, needed: Vec<EntityType>) -> DialogState {
        let mut state = DialogState::new(1, "s1", 24);
        state.phase = phase;
        state.intent = Some(Intent::BookingManagement);
        state.needed_entities = needed;
        state
    }

    #[test]
    fn yes_while_awaiting_confirmation_is_follow_up() {
        let state = state(DialogPhase::AwaitingConfirmation, vec![]);
        let detection = detect_follow_up("yes", Some(&state));
        assert!(detection.is_follow_up);
        assert!((detection.confidence - 0.95).abs() < f32::EPSILON);
    }

    #[test]
    fn short_time_answer_matches_expected_slot() {
        let state = state(DialogPhase::CollectingInfo, vec![EntityType::Time]);
        let detection = detect_follow_up("2 PM", Some(&state));
        assert!(detection.is_follow_up);
        assert_eq!(detection.expected_entity, Some(EntityType::Time));
        assert!((detection.confidence - 0.9).abs() < f32::EPSILON);
    }

    #[test]
    fn long_message_is_a_new_request() {
        let state = state(DialogPhase::CollectingInfo, vec![EntityType::Date]);
        let detection = detect_follow_up(
            "Actually, I want to cancel my previous booking instead of this",
            Some(&state),
        );
        assert!(!detection.is_follow_up);
        assert!((detection.confidence - 0.85).abs() < f32::EPSILON);
    }

    #[test]
    fn different_action_verb_breaks_follow_up() {
        let state = state(DialogPhase::CollectingInfo, vec![EntityType::Date]);
        let detection = detect_follow_up("cancel my order", Some(&state));
        assert!(!detection.is_follow_up);
    }

    #[test]
    fn no_state_means_no_follow_up() {
        let detection = detect_follow_up("tomorrow", None);
        assert!(!detection.is_follow_up);
        assert_eq!(detection.reason, "no active dialog state");
    }

    #[test]
    fn ambiguous_short_message_defers() {
        let state = state(DialogPhase::CollectingInfo, vec![EntityType::Date]);
        let detection = detect_follow_up("hmm maybe", Some(&state));
        assert!(!detection.is_follow_up);
        assert!((detection.confidence - 0.5).abs() < f32::EPSILON);
    }
}
