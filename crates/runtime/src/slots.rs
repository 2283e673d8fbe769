//! Slot-filling orchestration: extract → validate → store → ask, until the
//! intent's required slots are full, then confirm and execute.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context as _, Result, anyhow};
use serde_json::json;
use tracing::{info, warn};

use hearth_core::{
    ActionTaken, AddressBook, BookingRequest, BookingService, CollabError, ComplaintService,
    DialogPhase, DialogState, Entity, EntityType, Intent, PendingAction, PendingActionKind,
    Subcategory, TurnResult,
};
use hearth_dialog::{DialogStateManager, DialogStateUpdate};
use hearth_nlp::{
    EntityExtractor, EntityValidator, ExtractionContext, QuestionContext, QuestionGenerator,
    ValidationContext, agent_for_intent, required_entities,
};

pub struct SlotFillingOrchestrator {
    extractor: Arc<EntityExtractor>,
    validator: Arc<EntityValidator>,
    dialog: Arc<DialogStateManager>,
    bookings: Arc<dyn BookingService>,
    complaints: Arc<dyn ComplaintService>,
    addresses: Arc<dyn AddressBook>,
    max_slot_attempts: u32,
}

impl SlotFillingOrchestrator {
    pub fn new(
        extractor: Arc<EntityExtractor>,
        validator: Arc<EntityValidator>,
        dialog: Arc<DialogStateManager>,
        bookings: Arc<dyn BookingService>,
        complaints: Arc<dyn ComplaintService>,
        addresses: Arc<dyn AddressBook>,
        max_slot_attempts: u32,
    ) -> Self {
        Self {
            extractor,
            validator,
            dialog,
            bookings,
            complaints,
            addresses,
            max_slot_attempts,
        }
    }

    /// Begin a slot-filling dialog for a fresh transactional intent, seeding
    /// it with whatever the first message already contains.
    pub async fn start(
        &self,
        user_id: i64,
        session_id: &str,
        intent: Intent,
        text: &str,
    ) -> Result<TurnResult> {
        let required = required_entities(intent).to_vec();
        let entities = self
            .extractor
            .extract_multiple(text, &required, &ExtractionContext::default())
            .await;

        self.dialog
            .create_state(user_id, session_id, intent, HashMap::new(), required)
            .await?;
        self.dialog
            .update_state(
                session_id,
                DialogStateUpdate {
                    context: Some(HashMap::from([(
                        "original_request".to_string(),
                        json!(text),
                    )])),
                    ..Default::default()
                },
            )
            .await?;

        let failure = self.apply_entities(session_id, intent, entities).await?;
        self.next_step(session_id, failure).await
    }

    /// Handle one turn of an in-progress dialog.
    pub async fn continue_turn(&self, state: &DialogState, text: &str) -> Result<TurnResult> {
        match state.phase {
            DialogPhase::AwaitingConfirmation => self.handle_confirmation(state, text).await,
            _ => self.handle_slot_answer(state, text).await,
        }
    }

    async fn handle_slot_answer(&self, state: &DialogState, text: &str) -> Result<TurnResult> {
        let session_id = state.session_id.clone();
        let intent = state.intent.unwrap_or(Intent::UnclearIntent);

        let Some(expected) = state.expected_entity() else {
            return self.next_step(&session_id, None).await;
        };

        let extraction_ctx = ExtractionContext {
            available_subcategories: subcategories_from_context(state),
            today: None,
        };

        let mut entities: Vec<Entity> = self
            .extractor
            .extract_from_follow_up(text, expected, &extraction_ctx)
            .into_iter()
            .collect();
        if entities.is_empty() {
            // The answer may fill a different open slot ("actually make it
            // 4pm" while we asked for the date).
            entities = self
                .extractor
                .extract_multiple(text, &state.needed_entities, &extraction_ctx)
                .await;
        }

        if entities.is_empty() {
            return self.handle_slot_miss(&session_id, intent, expected).await;
        }

        let failure = self.apply_entities(&session_id, intent, entities).await?;
        if failure.is_some() {
            // A failed validation counts as an attempt on the current slot.
            if let Some(result) = self.bump_attempts(&session_id, intent, expected).await? {
                return Ok(result);
            }
        }
        self.next_step(&session_id, failure).await
    }

    async fn handle_slot_miss(
        &self,
        session_id: &str,
        intent: Intent,
        expected: EntityType,
    ) -> Result<TurnResult> {
        if let Some(result) = self.bump_attempts(session_id, intent, expected).await? {
            return Ok(result);
        }
        let reply = format!(
            "Sorry, I didn't catch that. {}",
            self.question_for(session_id, intent, expected).await?
        );
        self.remember_question(session_id, expected, &reply).await?;
        Ok(TurnResult::new(
            reply,
            intent,
            0.9,
            agent_for_intent(intent),
            ActionTaken::AskedQuestion,
        ))
    }

    /// Count an attempt at the current slot; after the configured maximum,
    /// give up and hand the user to support.
    async fn bump_attempts(
        &self,
        session_id: &str,
        intent: Intent,
        expected: EntityType,
    ) -> Result<Option<TurnResult>> {
        let Some(state) = self.dialog.get_active_state(session_id).await? else {
            return Ok(None);
        };
        let attempts = state.attempt_count() + 1;
        if attempts >= self.max_slot_attempts {
            warn!(session_id, slot = expected.as_str(), attempts, "slot filling escalated");
            self.dialog.clear_state(session_id).await?;
            return Ok(Some(TurnResult::new(
                "I'm having trouble understanding. Let me connect you with our support team, \
                 or you can start over with a fresh request.",
                intent,
                0.9,
                agent_for_intent(intent),
                ActionTaken::Escalated,
            )));
        }
        self.dialog
            .update_state(
                session_id,
                DialogStateUpdate {
                    context: Some(HashMap::from([(
                        "attempt_count".to_string(),
                        json!(attempts),
                    )])),
                    ..Default::default()
                },
            )
            .await?;
        Ok(None)
    }

    /// Validate and store extracted entities. Returns the first validation
    /// failure message (with suggestions folded in) for the caller to relay.
    async fn apply_entities(
        &self,
        session_id: &str,
        intent: Intent,
        entities: Vec<Entity>,
    ) -> Result<Option<String>> {
        let mut failure: Option<String> = None;

        for entity in entities {
            let Some(state) = self.dialog.get_active_state(session_id).await? else {
                break;
            };
            if !state.needed_entities.contains(&entity.entity_type) {
                continue;
            }

            // The extractor may have already pinned the exact subcategory
            // ("book waterproofing"); skip the selection sub-dialog entirely.
            if entity.entity_type == EntityType::ServiceType {
                if let Some(resolved) = entity.metadata.get("resolved_service") {
                    if resolved.get("subcategory_id").is_some() {
                        self.store_valid(
                            session_id,
                            EntityType::ServiceType,
                            json!(entity.normalized_value),
                            resolved_metadata(resolved),
                        )
                        .await?;
                        continue;
                    }
                }
            }

            let validation_ctx = ValidationContext {
                intent: Some(intent),
                available_subcategories: subcategories_from_context(&state),
                today: None,
            };
            let outcome = self
                .validator
                .validate(entity.entity_type, &entity.normalized_value, &validation_ctx)
                .await;

            if outcome.is_valid {
                let normalized = outcome
                    .normalized_value
                    .clone()
                    .unwrap_or(entity.normalized_value.clone());
                self.store_valid(
                    session_id,
                    entity.entity_type,
                    json!(normalized),
                    outcome.metadata.into_iter().collect(),
                )
                .await?;
            } else if outcome.requires_subcategory_selection() {
                self.begin_subcategory_selection(session_id, &outcome).await?;
            } else if failure.is_none() {
                let mut message = outcome
                    .error_message
                    .unwrap_or_else(|| "That doesn't look right.".to_string());
                if !outcome.suggestions.is_empty() {
                    message.push_str(&format!(" For example: {}.", outcome.suggestions.join(", ")));
                }
                failure = Some(message);
            }
        }

        Ok(failure)
    }

    async fn store_valid(
        &self,
        session_id: &str,
        entity_type: EntityType,
        value: serde_json::Value,
        metadata: Vec<(String, serde_json::Value)>,
    ) -> Result<()> {
        self.dialog.add_entity(session_id, entity_type, value).await?;
        for (key, metadata_value) in metadata {
            if matches!(
                key.as_str(),
                "category_id" | "subcategory_id" | "rate_card_id" | "existence_unverified"
            ) {
                self.dialog.add_metadata(session_id, &key, metadata_value).await?;
            }
        }
        self.dialog.remove_needed_entity(session_id, entity_type).await?;
        Ok(())
    }

    /// The chosen service needs a subcategory: remember the options and put
    /// that question at the front of the queue.
    async fn begin_subcategory_selection(
        &self,
        session_id: &str,
        outcome: &hearth_nlp::ValidationOutcome,
    ) -> Result<()> {
        let Some(state) = self.dialog.get_active_state(session_id).await? else {
            return Ok(());
        };
        let category_name = outcome.normalized_value.clone().unwrap_or_default();

        if let Some(value) = outcome.normalized_value.as_ref() {
            self.dialog
                .add_entity(session_id, EntityType::ServiceType, json!(value))
                .await?;
        }
        if let Some(category_id) = outcome.metadata.get("category_id") {
            self.dialog
                .add_metadata(session_id, "category_id", category_id.clone())
                .await?;
        }

        let mut needed: Vec<EntityType> = state
            .needed_entities
            .iter()
            .copied()
            .filter(|ty| *ty != EntityType::ServiceType && *ty != EntityType::ServiceSubcategory)
            .collect();
        needed.insert(0, EntityType::ServiceSubcategory);

        self.dialog
            .update_state(
                session_id,
                DialogStateUpdate {
                    needed_entities: Some(needed),
                    context: Some(HashMap::from([
                        (
                            "available_subcategories".to_string(),
                            outcome
                                .metadata
                                .get("available_subcategories")
                                .cloned()
                                .unwrap_or(serde_json::Value::Null),
                        ),
                        ("category_name".to_string(), json!(category_name)),
                    ])),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// Advance the dialog: auto-fill what we can, then either confirm or ask
    /// the next question.
    async fn next_step(&self, session_id: &str, failure: Option<String>) -> Result<TurnResult> {
        let state = self
            .dialog
            .get_active_state(session_id)
            .await?
            .ok_or_else(|| anyhow!("dialog state vanished mid-turn for {session_id}"))?;
        let intent = state.intent.unwrap_or(Intent::UnclearIntent);

        // Saved default address fills LOCATION without asking.
        if state.needed_entities.contains(&EntityType::Location) {
            if let Ok(Some(pincode)) = self.addresses.default_pincode(state.user_id).await {
                let outcome = self
                    .validator
                    .validate(EntityType::Location, &pincode, &ValidationContext::default())
                    .await;
                if outcome.is_valid {
                    info!(session_id, pincode, "location auto-filled from default address");
                    self.store_valid(session_id, EntityType::Location, json!(pincode), Vec::new())
                        .await?;
                }
            }
        }

        let state = self
            .dialog
            .get_active_state(session_id)
            .await?
            .ok_or_else(|| anyhow!("dialog state vanished mid-turn for {session_id}"))?;

        if let Some(expected) = state.expected_entity() {
            let question = match failure {
                Some(message) => message,
                None => self.question_for(session_id, intent, expected).await?,
            };
            self.remember_question(session_id, expected, &question).await?;
            return Ok(TurnResult::new(
                question,
                intent,
                0.9,
                agent_for_intent(intent),
                ActionTaken::AskedQuestion,
            ));
        }

        self.request_confirmation(&state).await
    }

    async fn question_for(
        &self,
        session_id: &str,
        intent: Intent,
        expected: EntityType,
    ) -> Result<String> {
        let state = self.dialog.get_active_state(session_id).await?;
        let question_ctx = QuestionContext {
            available_subcategories: state
                .as_ref()
                .map(subcategories_from_context)
                .unwrap_or_default(),
            category_name: state.as_ref().and_then(|state| {
                state
                    .context
                    .get("category_name")
                    .and_then(|value| value.as_str())
                    .map(ToString::to_string)
            }),
        };
        Ok(QuestionGenerator::generate(expected, intent, &question_ctx))
    }

    async fn remember_question(
        &self,
        session_id: &str,
        slot: EntityType,
        question: &str,
    ) -> Result<()> {
        let mut context = HashMap::from([
            ("last_question".to_string(), json!(question)),
            ("current_slot".to_string(), json!(slot.as_str())),
        ]);
        // Attempts are per-slot; moving on to a new question resets them.
        if let Some(state) = self.dialog.get_active_state(session_id).await? {
            let previous = state
                .context
                .get("current_slot")
                .and_then(|value| value.as_str());
            if previous != Some(slot.as_str()) {
                context.insert("attempt_count".to_string(), json!(0));
            }
        }
        self.dialog
            .update_state(
                session_id,
                DialogStateUpdate {
                    context: Some(context),
                    ..Default::default()
                },
            )
            .await?;
        Ok(())
    }

    /// All slots filled: build the pending action and ask for a go-ahead.
    async fn request_confirmation(&self, state: &DialogState) -> Result<TurnResult> {
        let intent = state.intent.unwrap_or(Intent::UnclearIntent);
        let (pending, summary) = build_pending_action(state)
            .with_context(|| format!("building pending action for {intent}"))?;

        self.dialog
            .update_state(
                &state.session_id,
                DialogStateUpdate {
                    phase: Some(DialogPhase::AwaitingConfirmation),
                    pending_action: Some(pending),
                    context: Some(HashMap::from([(
                        "last_question".to_string(),
                        json!(summary.clone()),
                    )])),
                    ..Default::default()
                },
            )
            .await?;

        Ok(TurnResult::new(
            summary,
            intent,
            0.9,
            agent_for_intent(intent),
            ActionTaken::RequestedConfirmation,
        ))
    }

    async fn handle_confirmation(&self, state: &DialogState, text: &str) -> Result<TurnResult> {
        let intent = state.intent.unwrap_or(Intent::UnclearIntent);

        if is_negative(text) {
            self.dialog.clear_state(&state.session_id).await?;
            return Ok(TurnResult::new(
                "No problem, I've discarded that. Is there anything else I can help with?",
                intent,
                0.95,
                agent_for_intent(intent),
                ActionTaken::None,
            ));
        }
        if is_affirmative(text) {
            return self.execute_pending(state).await;
        }

        Ok(TurnResult::new(
            format!(
                "Just to confirm — shall I go ahead? (yes/no)\n{}",
                state
                    .context
                    .get("last_question")
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
            ),
            intent,
            0.8,
            agent_for_intent(intent),
            ActionTaken::RequestedConfirmation,
        ))
    }

    async fn execute_pending(&self, state: &DialogState) -> Result<TurnResult> {
        let intent = state.intent.unwrap_or(Intent::UnclearIntent);
        let agent = agent_for_intent(intent);
        let pending = state
            .pending_action
            .clone()
            .ok_or_else(|| anyhow!("awaiting confirmation without a pending action"))?;

        self.dialog
            .update_state(
                &state.session_id,
                DialogStateUpdate {
                    phase: Some(DialogPhase::ExecutingAction),
                    ..Default::default()
                },
            )
            .await?;

        let executed = match pending.kind {
            PendingActionKind::CreateBooking => self.execute_booking(state, &pending).await,
            PendingActionKind::CancelBooking => self.execute_cancellation(state, &pending).await,
            PendingActionKind::FileComplaint => self.execute_complaint(state, &pending).await,
            PendingActionKind::RequestRefund => self.execute_refund(state, &pending).await,
        };

        match executed {
            Ok(result) => {
                self.dialog.clear_state(&state.session_id).await?;
                Ok(result)
            }
            Err(CollabError::Unavailable(reason)) => {
                warn!(session_id = %state.session_id, %reason, "collaborator unavailable");
                // Leave the dialog awaiting confirmation so "yes" can retry.
                self.dialog
                    .update_state(
                        &state.session_id,
                        DialogStateUpdate {
                            phase: Some(DialogPhase::AwaitingConfirmation),
                            ..Default::default()
                        },
                    )
                    .await?;
                Ok(TurnResult::new(
                    "Your request was received but we couldn't complete it right now. \
                     Please try again in a moment.",
                    intent,
                    0.9,
                    agent,
                    ActionTaken::Escalated,
                ))
            }
            Err(error) => {
                warn!(session_id = %state.session_id, %error, "pending action rejected");
                self.dialog.clear_state(&state.session_id).await?;
                Ok(TurnResult::new(
                    format!("I couldn't complete that: {error}. Our team has been notified."),
                    intent,
                    0.9,
                    agent,
                    ActionTaken::Escalated,
                ))
            }
        }
    }

    async fn execute_booking(
        &self,
        state: &DialogState,
        pending: &PendingAction,
    ) -> Result<TurnResult, CollabError> {
        let params = &pending.params;
        let request = BookingRequest {
            user_id: state.user_id,
            session_id: state.session_id.clone(),
            category_id: params["category_id"].as_i64().unwrap_or_default(),
            subcategory_id: params["subcategory_id"].as_i64().unwrap_or_default(),
            rate_card_id: params["rate_card_id"].as_i64().unwrap_or_default(),
            date: params["date"].as_str().unwrap_or_default().to_string(),
            time: params["time"].as_str().unwrap_or_default().to_string(),
            pincode: params["pincode"].as_str().map(ToString::to_string),
        };
        let confirmation = self.bookings.create_booking(request).await?;
        info!(
            session_id = %state.session_id,
            booking_id = %confirmation.booking_id,
            "booking created"
        );
        Ok(TurnResult::new(
            format!(
                "You're all set! Your booking is confirmed — booking ID {}.",
                confirmation.booking_id
            ),
            Intent::BookingManagement,
            0.95,
            agent_for_intent(Intent::BookingManagement),
            ActionTaken::CreatedBooking,
        )
        .with_metadata("booking_id", json!(confirmation.booking_id)))
    }

    async fn execute_cancellation(
        &self,
        state: &DialogState,
        pending: &PendingAction,
    ) -> Result<TurnResult, CollabError> {
        let booking_id = pending.params["booking_id"].as_str().unwrap_or_default();
        self.bookings.cancel_booking(state.user_id, booking_id).await?;
        Ok(TurnResult::new(
            format!("Done — booking {booking_id} has been cancelled."),
            Intent::CancellationRequest,
            0.95,
            agent_for_intent(Intent::CancellationRequest),
            ActionTaken::CancelledBooking,
        )
        .with_metadata("booking_id", json!(booking_id)))
    }

    async fn execute_complaint(
        &self,
        state: &DialogState,
        pending: &PendingAction,
    ) -> Result<TurnResult, CollabError> {
        let issue_type = pending.params["issue_type"].as_str().unwrap_or("other");
        let description = pending.params["description"].as_str().unwrap_or_default();
        let ticket = self
            .complaints
            .file_complaint(state.user_id, &state.session_id, issue_type, description)
            .await?;
        Ok(TurnResult::new(
            format!(
                "I'm sorry for the trouble. I've filed complaint {} and our team will reach out within 24 hours.",
                ticket.ticket_id
            ),
            Intent::Complaint,
            0.95,
            agent_for_intent(Intent::Complaint),
            ActionTaken::FiledComplaint,
        )
        .with_metadata("ticket_id", json!(ticket.ticket_id)))
    }

    async fn execute_refund(
        &self,
        state: &DialogState,
        pending: &PendingAction,
    ) -> Result<TurnResult, CollabError> {
        let booking_id = pending.params["booking_id"].as_str().unwrap_or_default();
        let reason = pending.params["reason"].as_str().unwrap_or("customer request");
        self.bookings
            .request_refund(state.user_id, booking_id, reason)
            .await?;
        Ok(TurnResult::new(
            format!(
                "I've submitted a refund request for booking {booking_id}. \
                 Refunds are typically processed within 5 business days."
            ),
            Intent::RefundRequest,
            0.95,
            agent_for_intent(Intent::RefundRequest),
            ActionTaken::RequestedRefund,
        )
        .with_metadata("booking_id", json!(booking_id)))
    }
}

// ── helpers ───────────────────────────────────────────────────────────────────

fn subcategories_from_context(state: &DialogState) -> Vec<Subcategory> {
    state
        .context
        .get("available_subcategories")
        .cloned()
        .and_then(|value| serde_json::from_value(value).ok())
        .unwrap_or_default()
}

fn resolved_metadata(resolved: &serde_json::Value) -> Vec<(String, serde_json::Value)> {
    ["category_id", "subcategory_id", "rate_card_id"]
        .iter()
        .filter_map(|key| resolved.get(*key).map(|value| (key.to_string(), value.clone())))
        .collect()
}

fn is_affirmative(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| matches!(word, "yes" | "yeah" | "yep" | "sure" | "ok" | "okay" | "confirm" | "correct"))
}

fn is_negative(text: &str) -> bool {
    let lowered = text.to_lowercase();
    lowered
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| matches!(word, "no" | "nope" | "nah" | "cancel" | "dont" | "don"))
}

/// Build the pending action and its user-facing confirmation summary from a
/// fully-collected dialog state.
fn build_pending_action(state: &DialogState) -> Result<(PendingAction, String)> {
    let intent = state.intent.ok_or_else(|| anyhow!("dialog state has no intent"))?;
    let collected = &state.collected_entities;
    let text_of = |key: &str| {
        collected
            .get(key)
            .and_then(|value| value.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let id_of = |key: &str| {
        state
            .metadata_value(key)
            .and_then(|value| value.as_i64())
            .unwrap_or_default()
    };

    match intent {
        Intent::BookingManagement => {
            let service = collected
                .get("service_subcategory")
                .or_else(|| collected.get("service_type"))
                .and_then(|value| value.as_str())
                .unwrap_or("the service")
                .to_string();
            let date = text_of("date");
            let time = text_of("time");
            let pincode = text_of("location");

            let params = json!({
                "category_id": id_of("category_id"),
                "subcategory_id": id_of("subcategory_id"),
                "rate_card_id": id_of("rate_card_id"),
                "date": date,
                "time": time,
                "pincode": if pincode.is_empty() { serde_json::Value::Null } else { json!(pincode) },
            });
            let mut summary =
                format!("Here's what I have: {service} on {date} at {time}");
            if !pincode.is_empty() {
                summary.push_str(&format!(" (pincode {pincode})"));
            }
            summary.push_str(". Shall I confirm the booking? (yes/no)");
            Ok((
                PendingAction {
                    kind: PendingActionKind::CreateBooking,
                    params,
                },
                summary,
            ))
        }
        Intent::CancellationRequest => {
            let booking_id = text_of("booking_id");
            Ok((
                PendingAction {
                    kind: PendingActionKind::CancelBooking,
                    params: json!({"booking_id": booking_id}),
                },
                format!("I'll cancel booking {booking_id}. Shall I go ahead? (yes/no)"),
            ))
        }
        Intent::Complaint => {
            let issue_type = text_of("issue_type");
            let description = state
                .context
                .get("original_request")
                .and_then(|value| value.as_str())
                .unwrap_or_default()
                .to_string();
            Ok((
                PendingAction {
                    kind: PendingActionKind::FileComplaint,
                    params: json!({"issue_type": issue_type, "description": description}),
                },
                format!(
                    "I'll file a complaint about {} on your behalf. Shall I go ahead? (yes/no)",
                    issue_type.replace('_', " ")
                ),
            ))
        }
        Intent::RefundRequest => {
            let booking_id = text_of("booking_id");
            Ok((
                PendingAction {
                    kind: PendingActionKind::RequestRefund,
                    params: json!({"booking_id": booking_id, "reason": "customer request"}),
                },
                format!("I'll request a refund for booking {booking_id}. Shall I go ahead? (yes/no)"),
            ))
        }
        other => Err(anyhow!("intent {other} does not produce pending actions")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn affirmation_and_denial_tokens() {
        assert!(is_affirmative("yes"));
        assert!(is_affirmative("Yes, please!"));
        assert!(is_affirmative("ok sure"));
        assert!(!is_affirmative("what?"));

        assert!(is_negative("no"));
        assert!(is_negative("nope, cancel it"));
        assert!(!is_negative("yes"));
    }

    #[test]
    fn booking_pending_action_carries_rate_card() {
        let mut state = DialogState::new(1, "sess", 24);
        state.intent = Some(Intent::BookingManagement);
        state
            .collected_entities
            .insert("service_subcategory".into(), json!("Interior Painting"));
        state.collected_entities.insert("date".into(), json!("2025-10-10"));
        state.collected_entities.insert("time".into(), json!("16:00"));
        state.collected_entities.insert("location".into(), json!("400001"));
        state.metadata.insert("category_id".into(), json!(1));
        state.metadata.insert("subcategory_id".into(), json!(11));
        state.metadata.insert("rate_card_id".into(), json!(110));

        let (pending, summary) = build_pending_action(&state).unwrap();
        assert_eq!(pending.kind, PendingActionKind::CreateBooking);
        assert_eq!(pending.params["rate_card_id"], 110);
        assert_eq!(pending.params["date"], "2025-10-10");
        assert!(summary.contains("Interior Painting"));
        assert!(summary.contains("yes/no"));
    }

    #[test]
    fn legacy_metadata_keys_still_feed_pending_actions() {
        let mut state = DialogState::new(1, "sess", 24);
        state.intent = Some(Intent::BookingManagement);
        state.collected_entities.insert("service_type".into(), json!("Plumbing"));
        state.collected_entities.insert("date".into(), json!("2025-10-10"));
        state.collected_entities.insert("time".into(), json!("10:00"));
        state
            .collected_entities
            .insert("_metadata_rate_card_id".into(), json!(210));

        let (pending, _) = build_pending_action(&state).unwrap();
        assert_eq!(pending.params["rate_card_id"], 210);
    }

    #[test]
    fn non_transactional_intents_have_no_pending_action() {
        let mut state = DialogState::new(1, "sess", 24);
        state.intent = Some(Intent::Greeting);
        assert!(build_pending_action(&state).is_err());
    }
}
