//! The per-turn driver: guardrails in, classify, route, guardrails out,
//! persist, respond. A turn never surfaces an error to the transport; every
//! failure path degrades to a friendly reply.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use hearth_core::{
    ActionTaken, AddressBook, BookingService, ClassifiedIntent, ComplaintService,
    ConversationMessage, DialogPhase, DialogState, Intent, MessageStore, ServiceCatalog,
    TurnRequest, TurnResult,
};
use hearth_dialog::{DialogStateManager, followup::detect_follow_up};
use hearth_guardrails::{GuardrailContext, GuardrailManager, GuardrailReport};
use hearth_nlp::{EntityExtractor, EntityValidator, IntentClassifier};
use hearth_rag::PolicyRagEngine;

use crate::handlers::{HandlerKind, IntentHandlers, handler_kind};
use crate::slots::SlotFillingOrchestrator;

/// What one chat turn hands back to the HTTP layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatTurn {
    pub session_id: String,
    pub user_message: ConversationMessage,
    pub assistant_message: ConversationMessage,
    pub response_time_ms: u64,
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Everything the coordinator composes. Collaborators arrive as trait
/// objects so the surrounding application owns their lifetimes and storage.
pub struct CoordinatorDeps {
    pub guardrails: Arc<GuardrailManager>,
    pub classifier: IntentClassifier,
    pub extractor: Arc<EntityExtractor>,
    pub validator: Arc<EntityValidator>,
    pub dialog: Arc<DialogStateManager>,
    pub policy_engine: Arc<PolicyRagEngine>,
    pub catalog: Arc<ServiceCatalog>,
    pub bookings: Arc<dyn BookingService>,
    pub complaints: Arc<dyn ComplaintService>,
    pub addresses: Arc<dyn AddressBook>,
    pub messages: Arc<dyn MessageStore>,
    pub history_limit: usize,
    pub max_slot_attempts: u32,
}

pub struct Coordinator {
    guardrails: Arc<GuardrailManager>,
    classifier: IntentClassifier,
    dialog: Arc<DialogStateManager>,
    messages: Arc<dyn MessageStore>,
    handlers: IntentHandlers,
    slots: SlotFillingOrchestrator,
    history_limit: usize,
    /// One lock per session: two turns of the same session never interleave.
    session_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl Coordinator {
    pub fn new(deps: CoordinatorDeps) -> Self {
        let handlers = IntentHandlers::new(
            Arc::clone(&deps.catalog),
            Arc::clone(&deps.policy_engine),
            Arc::clone(&deps.extractor),
        );
        let slots = SlotFillingOrchestrator::new(
            deps.extractor,
            deps.validator,
            Arc::clone(&deps.dialog),
            deps.bookings,
            deps.complaints,
            deps.addresses,
            deps.max_slot_attempts,
        );
        Self {
            guardrails: deps.guardrails,
            classifier: deps.classifier,
            dialog: deps.dialog,
            messages: deps.messages,
            handlers,
            slots,
            history_limit: deps.history_limit,
            session_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Drive one turn end to end. Infallible by contract: every internal
    /// error becomes a generic reply and the turn still completes.
    pub async fn process_turn(&self, request: TurnRequest) -> ChatTurn {
        let session_id = request
            .session_id
            .clone()
            .filter(|session_id| !session_id.trim().is_empty())
            .unwrap_or_else(|| format!("sess_{}", Uuid::new_v4().simple()));

        let lock = self.session_lock(&session_id).await;
        let _turn_guard = lock.lock().await;
        let started = Instant::now();

        let mut ctx = GuardrailContext::for_user(request.user_id);
        ctx.channel = request.channel.clone();

        let input_report = self.guardrails.check_input(&request.text, &ctx).await;
        if input_report.is_blocked {
            info!(session_id, "input blocked by guardrails");
            return self
                .blocked_turn(&request, &session_id, &input_report, started)
                .await;
        }
        // Downstream stages (classifier included) only ever see the
        // sanitized text.
        let safe_text = input_report.final_text.clone();

        let history = match self.messages.recent(&session_id, self.history_limit).await {
            Ok(history) => history,
            Err(error) => {
                warn!(%error, session_id, "history unavailable, classifying without it");
                Vec::new()
            }
        };
        let active_state = match self.dialog.get_active_state(&session_id).await {
            Ok(state) => state,
            Err(error) => {
                warn!(%error, session_id, "dialog state unavailable");
                None
            }
        };

        let follow_up = detect_follow_up(&safe_text, active_state.as_ref());
        let classification = self
            .classifier
            .classify(&safe_text, &history, active_state.as_ref())
            .await;

        let active_state = self
            .resolve_contradiction(&session_id, active_state, &follow_up, &classification)
            .await;

        let routed = self
            .route(&request, &session_id, &safe_text, active_state, &classification)
            .await;
        let result = routed.unwrap_or_else(|error| {
            error!(
                %error,
                session_id,
                user_id = request.user_id,
                intent = %classification.primary,
                "turn handler failed"
            );
            TurnResult::new(
                "I'm having trouble with that right now. Please try again in a moment.",
                classification.primary,
                classification.confidence(),
                "coordinator",
                ActionTaken::None,
            )
            .with_metadata("error", json!(true))
        });

        let output_report = self.guardrails.check_output(&result.response_text, &ctx).await;
        if output_report.is_blocked {
            warn!(session_id, "assistant response blocked by output guardrails");
        }
        let final_text = output_report.final_text.clone();

        let response_time_ms = started.elapsed().as_millis() as u64;
        let mut metadata = HashMap::from([
            ("intent".to_string(), json!(result.intent)),
            ("confidence".to_string(), json!(result.confidence)),
            ("agent_used".to_string(), json!(result.agent_used)),
            (
                "classification_method".to_string(),
                json!(classification.method),
            ),
            ("action_taken".to_string(), json!(result.action_taken)),
            ("is_follow_up".to_string(), json!(follow_up.is_follow_up)),
        ]);
        for (key, value) in &result.metadata {
            metadata.insert(key.clone(), value.clone());
        }
        if output_report.is_blocked {
            metadata.insert("output_blocked".to_string(), json!(true));
        }

        let mut user_message = ConversationMessage::user(request.user_id, &session_id, &safe_text);
        user_message.intent = Some(result.intent);
        user_message.confidence = Some(classification.confidence());

        let mut assistant_message =
            ConversationMessage::assistant(request.user_id, &session_id, &final_text);
        assistant_message.intent = Some(result.intent);
        assistant_message.confidence = Some(result.confidence);
        assistant_message.agent_used = Some(result.agent_used.clone());
        assistant_message.response_time_ms = Some(response_time_ms);

        self.persist(&user_message).await;
        self.persist(&assistant_message).await;

        info!(
            session_id,
            user_id = request.user_id,
            intent = %result.intent,
            agent = %result.agent_used,
            method = classification.method.as_str(),
            response_time_ms,
            "turn complete"
        );

        ChatTurn {
            session_id,
            user_message,
            assistant_message,
            response_time_ms,
            metadata,
        }
    }

    /// A confident, non-follow-up classification of a different intent wins
    /// over the in-progress dialog: clear it and start fresh.
    async fn resolve_contradiction(
        &self,
        session_id: &str,
        active_state: Option<DialogState>,
        follow_up: &hearth_dialog::FollowUpDetection,
        classification: &ClassifiedIntent,
    ) -> Option<DialogState> {
        let Some(state) = active_state else {
            return None;
        };
        let contradicts = !follow_up.is_follow_up
            && follow_up.confidence >= 0.8
            && classification.confidence() >= 0.85
            && classification.primary != Intent::UnclearIntent
            && state.intent != Some(classification.primary);
        if contradicts {
            info!(
                session_id,
                old_intent = state.intent.map(|intent| intent.as_str()).unwrap_or("none"),
                new_intent = %classification.primary,
                "new intent overrides active dialog"
            );
            if let Err(error) = self.dialog.clear_state(session_id).await {
                warn!(%error, session_id, "failed to clear contradicted dialog state");
            }
            return None;
        }
        Some(state)
    }

    async fn route(
        &self,
        request: &TurnRequest,
        session_id: &str,
        safe_text: &str,
        active_state: Option<DialogState>,
        classification: &ClassifiedIntent,
    ) -> Result<TurnResult> {
        if let Some(state) = active_state {
            if matches!(
                state.phase,
                DialogPhase::CollectingInfo | DialogPhase::AwaitingConfirmation
            ) {
                return self.slots.continue_turn(&state, safe_text).await;
            }
        }

        match handler_kind(classification.primary) {
            HandlerKind::SlotFilling => {
                self.slots
                    .start(request.user_id, session_id, classification.primary, safe_text)
                    .await
            }
            _ => Ok(self
                .handlers
                .handle(classification.primary, safe_text, classification)
                .await),
        }
    }

    async fn blocked_turn(
        &self,
        request: &TurnRequest,
        session_id: &str,
        report: &GuardrailReport,
        started: Instant,
    ) -> ChatTurn {
        let user_message = ConversationMessage::user(request.user_id, session_id, &request.text);
        let mut assistant_message =
            ConversationMessage::assistant(request.user_id, session_id, &report.final_text);
        let response_time_ms = started.elapsed().as_millis() as u64;
        assistant_message.agent_used = Some("guardrails".to_string());
        assistant_message.response_time_ms = Some(response_time_ms);

        self.persist(&user_message).await;
        self.persist(&assistant_message).await;

        let blocked_by: Vec<&str> = report
            .results
            .iter()
            .filter(|result| result.action == hearth_guardrails::Action::Block)
            .map(|result| result.guardrail_name.as_str())
            .collect();
        let mut metadata = HashMap::from([
            ("guardrail_blocked".to_string(), json!(true)),
            ("blocked_by".to_string(), json!(blocked_by)),
        ]);
        // Rate-limit blocks carry retry timing for the transport to surface.
        if let Some(retry_after) = report
            .results
            .iter()
            .find_map(|result| result.details.get("retry_after_seconds"))
        {
            metadata.insert("retry_after_seconds".to_string(), retry_after.clone());
        }

        ChatTurn {
            session_id: session_id.to_string(),
            user_message,
            assistant_message,
            response_time_ms,
            metadata,
        }
    }

    async fn persist(&self, message: &ConversationMessage) {
        if let Err(error) = self.messages.append(message.clone()).await {
            warn!(%error, session_id = %message.session_id, "failed to persist message");
        }
    }

    async fn session_lock(&self, session_id: &str) -> Arc<Mutex<()>> {
        let mut locks = self.session_locks.lock().await;
        Arc::clone(
            locks
                .entry(session_id.to_string())
                .or_insert_with(|| Arc::new(Mutex::new(()))),
        )
    }
}
