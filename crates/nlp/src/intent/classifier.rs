//! Two-tier intent classifier.
//!
//! Tier 1 scans the curated pattern table; a confident hit returns without
//! touching the network. Tier 2 builds a context-aware prompt (history +
//! dialog state + the closed label set) and asks the classification-tuned
//! model, treating its output as untrusted: JSON is validated, labels are
//! checked against the closed set, and any failure degrades to
//! `unclear_intent` with a clarification request.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use hearth_core::{
    ClassificationMethod, ClassifiedIntent, ConversationMessage, DialogState, Intent, IntentScore,
};
use hearth_llm::{ChatMessage, ChatModel, GenerationParams, extract_json};

use super::config::COMPILED_CONFIGS;

const PATTERN_THRESHOLD: f32 = 0.85;

pub struct IntentClassifier {
    model: Option<Arc<dyn ChatModel>>,
    params: GenerationParams,
    history_limit: usize,
}

impl IntentClassifier {
    pub fn new(
        model: Option<Arc<dyn ChatModel>>,
        params: GenerationParams,
        history_limit: usize,
    ) -> Self {
        Self {
            model,
            params,
            history_limit,
        }
    }

    pub async fn classify(
        &self,
        message: &str,
        history: &[ConversationMessage],
        dialog_state: Option<&DialogState>,
    ) -> ClassifiedIntent {
        let context_summary = build_context_summary(history, dialog_state);

        if let Some(mut classified) = classify_by_patterns(message) {
            classified.context_summary = Some(context_summary);
            debug!(primary = %classified.primary, "pattern tier classified message");
            return classified;
        }

        let Some(model) = &self.model else {
            return ClassifiedIntent::unclear("no language model configured");
        };

        let prompt = build_context_aware_intent_prompt(
            message,
            &history[history.len().saturating_sub(self.history_limit)..],
            dialog_state,
        );
        let messages = [ChatMessage::user(prompt)];
        match model.complete(&messages, &self.params).await {
            Ok(raw) => match parse_llm_classification(&raw) {
                Some(mut classified) => {
                    classified.context_summary = Some(context_summary);
                    classified
                }
                None => {
                    warn!("llm classification response did not parse");
                    ClassifiedIntent::unclear("classifier returned an unparseable response")
                }
            },
            Err(error) => {
                warn!(%error, "llm classification failed");
                ClassifiedIntent::unclear(format!("classification error: {error}"))
            }
        }
    }
}

// ── Pattern tier ──────────────────────────────────────────────────────────────

/// Scan the pattern table, collecting every matching intent with the best
/// confidence among its patterns. A hit at or above the threshold wins;
/// declaration order breaks ties so more transactional intents lead.
pub fn classify_by_patterns(message: &str) -> Option<ClassifiedIntent> {
    let mut scores: Vec<IntentScore> = Vec::new();
    for compiled in COMPILED_CONFIGS.iter() {
        let best = compiled
            .patterns
            .iter()
            .filter(|(pattern, _)| pattern.is_match(message))
            .map(|(_, confidence)| *confidence)
            .fold(None::<f32>, |acc, c| Some(acc.map_or(c, |a| a.max(c))));
        if let Some(confidence) = best {
            scores.push(IntentScore {
                intent: compiled.config.intent,
                confidence,
                entities: HashMap::new(),
            });
        }
    }

    // Stable sort: ties keep table order.
    scores.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    let primary = scores.first()?;
    if primary.confidence < PATTERN_THRESHOLD {
        return None;
    }

    Some(ClassifiedIntent {
        primary: primary.intent,
        intents: scores.clone(),
        method: ClassificationMethod::Pattern,
        requires_clarification: false,
        clarification_reason: None,
        context_summary: None,
    })
}

// ── LLM tier ──────────────────────────────────────────────────────────────────

/// Build the context-aware classification prompt.
///
/// The follow-up rules here are load-bearing: a short "yes" while a booking
/// awaits confirmation must classify as the in-progress intent, not as a
/// greeting or a new request.
pub fn build_context_aware_intent_prompt(
    user_message: &str,
    conversation_history: &[ConversationMessage],
    dialog_state: Option<&DialogState>,
) -> String {
    let mut prompt = String::from(
        "You are the intent classifier for a home-services marketplace assistant.\n\n",
    );

    let labels = Intent::ALL
        .iter()
        .map(|intent| intent.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let _ = writeln!(prompt, "Allowed intents (closed set): {labels}.\n");

    if !conversation_history.is_empty() {
        prompt.push_str("Conversation History:\n");
        for message in conversation_history {
            let _ = writeln!(prompt, "{}: {}", message.role.as_str(), message.text);
        }
        prompt.push('\n');
    }

    if let Some(state) = dialog_state {
        prompt.push_str("Active Dialog State:\n");
        let _ = writeln!(prompt, "- state: {}", state.phase.as_str());
        if let Some(intent) = state.intent {
            let _ = writeln!(prompt, "- intent: {intent}");
        }
        if !state.collected_entities.is_empty() {
            let mut keys: Vec<&str> = state
                .collected_entities
                .keys()
                .filter(|key| !key.starts_with("_metadata_"))
                .map(String::as_str)
                .collect();
            keys.sort_unstable();
            let _ = writeln!(prompt, "- collected: {}", keys.join(", "));
        }
        if !state.needed_entities.is_empty() {
            let needed = state
                .needed_entities
                .iter()
                .map(|entity| entity.as_str())
                .collect::<Vec<_>>()
                .join(", ");
            let _ = writeln!(prompt, "- still needed: {needed}");
        }
        if let Some(question) = state.context.get("last_question").and_then(|v| v.as_str()) {
            let _ = writeln!(prompt, "- last question asked: {question}");
        }
        prompt.push('\n');
    }

    if dialog_state.is_some() || !conversation_history.is_empty() {
        prompt.push_str(
            "IMPORTANT - Context-Aware Classification:\n\
             The user may be answering the assistant's last question rather than\n\
             starting something new. Decide whether this message is a follow-up\n\
             response to the active dialog or a NEW intent.\n\n",
        );
    }

    let _ = writeln!(prompt, "Current User Message: {user_message}\n");

    prompt.push_str(
        "Instructions:\n\
         - If it's a follow-up response: keep the in-progress intent. A short\n\
           confirmation or denial while the dialog awaits confirmation, or a short\n\
           answer matching the entity the assistant just asked for, is a follow-up.\n\
         - If it's a NEW intent: classify it on its own and say so; a clear new\n\
           action request overrides the active dialog.\n\
         - Entity Extraction: include any service names, dates, times, locations,\n\
           booking ids or issue descriptions you can identify.\n\
         - Detect every intent present, not just the first; order by confidence.\n\n\
         Respond with JSON only:\n\
         {\"primary_intent\": \"...\", \"intents\": [{\"intent\": \"...\", \"confidence\": 0.0, \"entities\": {}}], \"requires_clarification\": false, \"clarification_reason\": null}\n",
    );

    prompt
}

#[derive(Debug, Deserialize)]
struct LlmIntentScore {
    intent: String,
    #[serde(default)]
    confidence: f32,
    #[serde(default)]
    entities: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct LlmClassification {
    primary_intent: String,
    #[serde(default)]
    intents: Vec<LlmIntentScore>,
    #[serde(default)]
    requires_clarification: bool,
    #[serde(default)]
    clarification_reason: Option<String>,
}

/// Validate the model's JSON against the closed label set. Unknown labels are
/// dropped; an unusable payload yields `None` so the caller can fall back.
pub fn parse_llm_classification(raw: &str) -> Option<ClassifiedIntent> {
    let parsed: LlmClassification = extract_json(raw)?;
    let primary = Intent::parse(&parsed.primary_intent)?;

    let mut intents: Vec<IntentScore> = parsed
        .intents
        .into_iter()
        .filter_map(|score| {
            Intent::parse(&score.intent).map(|intent| IntentScore {
                intent,
                confidence: score.confidence.clamp(0.0, 1.0),
                entities: score.entities,
            })
        })
        .collect();
    if intents.is_empty() {
        intents.push(IntentScore {
            intent: primary,
            confidence: 0.5,
            entities: HashMap::new(),
        });
    }
    intents.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    Some(ClassifiedIntent {
        primary,
        intents,
        method: ClassificationMethod::Llm,
        requires_clarification: parsed.requires_clarification,
        clarification_reason: parsed.clarification_reason,
        context_summary: None,
    })
}

/// One-line summary of the turn's context, recorded on the classification
/// for the ops transcript.
pub fn build_context_summary(
    history: &[ConversationMessage],
    dialog_state: Option<&DialogState>,
) -> String {
    let mut parts = Vec::new();
    if !history.is_empty() {
        parts.push(format!("{} previous messages", history.len()));
    }
    if let Some(state) = dialog_state {
        let intent = state
            .intent
            .map(|intent| intent.as_str())
            .unwrap_or("unknown");
        parts.push(format!("active state {} for {intent}", state.phase.as_str()));
    }
    if parts.is_empty() {
        "no prior context".to_string()
    } else {
        parts.join("; ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_core::{DialogPhase, EntityType};

    fn booking_state() -> DialogState {
        let mut state = DialogState::new(1, "sess", 24);
        state.phase = DialogPhase::CollectingInfo;
        state.intent = Some(Intent::BookingManagement);
        state
            .collected_entities
            .insert("service_type".into(), serde_json::json!("ac"));
        state
            .collected_entities
            .insert("action".into(), serde_json::json!("book"));
        state.needed_entities = vec![EntityType::Date, EntityType::Time];
        state.context.insert(
            "last_question".into(),
            serde_json::json!("What date would you like?"),
        );
        state
    }

    // ── pattern tier ───────────────────────────────────────────────────────

    #[test]
    fn greeting_matches_pattern_tier() {
        let classified = classify_by_patterns("Hello").unwrap();
        assert_eq!(classified.primary, Intent::Greeting);
        assert_eq!(classified.method, ClassificationMethod::Pattern);
        assert!(classified.confidence() >= 0.9);
    }

    #[test]
    fn pricing_question_matches_pattern_tier() {
        let classified = classify_by_patterns("How much does plumbing cost?").unwrap();
        assert_eq!(classified.primary, Intent::PricingInquiry);
    }

    #[test]
    fn multi_intent_message_emits_both_with_booking_primary() {
        let classified =
            classify_by_patterns("I want to book AC service and know the price").unwrap();
        assert_eq!(classified.primary, Intent::BookingManagement);
        let labels: Vec<Intent> = classified.intents.iter().map(|s| s.intent).collect();
        assert!(labels.contains(&Intent::BookingManagement));
        assert!(labels.contains(&Intent::PricingInquiry));
    }

    #[test]
    fn cancellation_policy_is_policy_not_cancellation() {
        let classified = classify_by_patterns("What is your cancellation policy?").unwrap();
        assert_eq!(classified.primary, Intent::PolicyInquiry);
    }

    #[test]
    fn ambiguous_message_falls_past_pattern_tier() {
        assert!(classify_by_patterns("hmm about that thing yesterday").is_none());
    }

    // ── prompt builder ─────────────────────────────────────────────────────

    #[test]
    fn prompt_includes_history_and_message() {
        let history = vec![
            ConversationMessage::user(1, "sess", "I want to book AC servicing"),
            ConversationMessage::assistant(1, "sess", "What date would you like to schedule?"),
        ];
        let prompt = build_context_aware_intent_prompt("tomorrow", &history, None);
        assert!(prompt.contains("Conversation History:"));
        assert!(prompt.contains("I want to book AC servicing"));
        assert!(prompt.contains("What date would you like to schedule?"));
        assert!(prompt.contains("Current User Message: tomorrow"));
    }

    #[test]
    fn prompt_includes_dialog_state() {
        let state = booking_state();
        let prompt = build_context_aware_intent_prompt("2 PM", &[], Some(&state));
        assert!(prompt.contains("Active Dialog State:"));
        assert!(prompt.contains("collecting_info"));
        assert!(prompt.contains("booking_management"));
        assert!(prompt.contains("date, time"));
        assert!(prompt.contains("What date would you like?"));
    }

    #[test]
    fn prompt_has_all_required_sections() {
        let history = vec![ConversationMessage::user(1, "sess", "book ac")];
        let state = booking_state();
        let prompt = build_context_aware_intent_prompt("yes", &history, Some(&state));
        for section in [
            "IMPORTANT - Context-Aware Classification:",
            "Conversation History:",
            "Active Dialog State:",
            "Current User Message:",
            "Instructions:",
            "If it's a follow-up response:",
            "If it's a NEW intent:",
            "Entity Extraction:",
        ] {
            assert!(prompt.contains(section), "missing section: {section}");
        }
        // The closed label set is spelled out.
        assert!(prompt.contains("booking_management"));
        assert!(prompt.contains("unclear_intent"));
    }

    // ── llm response parsing ───────────────────────────────────────────────

    #[test]
    fn parses_well_formed_llm_response() {
        let raw = r#"```json
{"primary_intent": "booking_management",
 "intents": [{"intent": "booking_management", "confidence": 0.92, "entities": {"service_type": "ac"}},
             {"intent": "pricing_inquiry", "confidence": 0.4, "entities": {}}],
 "requires_clarification": false,
 "clarification_reason": null}
```"#;
        let classified = parse_llm_classification(raw).unwrap();
        assert_eq!(classified.primary, Intent::BookingManagement);
        assert_eq!(classified.intents.len(), 2);
        assert_eq!(classified.method, ClassificationMethod::Llm);
        assert_eq!(
            classified.intents[0].entities["service_type"],
            serde_json::json!("ac")
        );
    }

    #[test]
    fn unknown_labels_are_dropped_not_trusted() {
        let raw = r#"{"primary_intent": "booking_management",
            "intents": [{"intent": "made_up_intent", "confidence": 0.99},
                        {"intent": "booking_management", "confidence": 0.8}]}"#;
        let classified = parse_llm_classification(raw).unwrap();
        assert_eq!(classified.intents.len(), 1);
        assert_eq!(classified.intents[0].intent, Intent::BookingManagement);
    }

    #[test]
    fn unknown_primary_label_fails_parse() {
        let raw = r#"{"primary_intent": "nonsense", "intents": []}"#;
        assert!(parse_llm_classification(raw).is_none());
    }

    #[test]
    fn confidence_is_clamped_to_unit_interval() {
        let raw = r#"{"primary_intent": "greeting",
            "intents": [{"intent": "greeting", "confidence": 3.5}]}"#;
        let classified = parse_llm_classification(raw).unwrap();
        assert!(classified.confidence() <= 1.0);
    }

    // ── context summary ────────────────────────────────────────────────────

    #[test]
    fn context_summary_covers_history_and_state() {
        let history = vec![
            ConversationMessage::user(1, "s", "a"),
            ConversationMessage::assistant(1, "s", "b"),
            ConversationMessage::user(1, "s", "c"),
        ];
        let mut state = booking_state();
        state.phase = DialogPhase::AwaitingConfirmation;

        let summary = build_context_summary(&history, Some(&state));
        assert!(summary.contains("3 previous messages"));
        assert!(summary.contains("awaiting_confirmation"));
        assert!(summary.contains("booking_management"));

        assert_eq!(build_context_summary(&[], None), "no prior context");
    }

    // ── classifier end to end (scripted model) ─────────────────────────────

    struct Scripted(&'static str);

    #[async_trait::async_trait]
    impl ChatModel for Scripted {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<String, hearth_llm::LlmError> {
            Ok(self.0.to_string())
        }
    }

    struct Failing;

    #[async_trait::async_trait]
    impl ChatModel for Failing {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _params: &GenerationParams,
        ) -> Result<String, hearth_llm::LlmError> {
            Err(hearth_llm::LlmError::Permanent {
                status: 400,
                message: "boom".into(),
            })
        }
    }

    fn params() -> GenerationParams {
        GenerationParams::for_classification(&hearth_config::LlmConfig::default())
    }

    #[tokio::test]
    async fn llm_tier_runs_when_patterns_miss() {
        let classifier = IntentClassifier::new(
            Some(Arc::new(Scripted(
                r#"{"primary_intent": "complaint", "intents": [{"intent": "complaint", "confidence": 0.8}]}"#,
            ))),
            params(),
            10,
        );
        let classified = classifier
            .classify("the person who came by yesterday left a mess", &[], None)
            .await;
        assert_eq!(classified.primary, Intent::Complaint);
        assert_eq!(classified.method, ClassificationMethod::Llm);
    }

    #[tokio::test]
    async fn llm_failure_degrades_to_unclear() {
        let classifier = IntentClassifier::new(Some(Arc::new(Failing)), params(), 10);
        let classified = classifier
            .classify("something something mystery", &[], None)
            .await;
        assert_eq!(classified.primary, Intent::UnclearIntent);
        assert_eq!(classified.confidence(), 0.0);
        assert!(classified.requires_clarification);
    }
}
