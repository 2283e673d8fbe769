use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hearth_core::{DialogPhase, DialogState, EntityType, Intent, PendingAction};

use crate::followup::{FollowUpDetection, detect_follow_up};
use crate::store::DialogStore;

/// Patch applied by [`DialogStateManager::update_state`].
///
/// Merge semantics follow the storage contract: `collected_entities`,
/// `metadata` and `context` merge key-by-key, `needed_entities` replaces the
/// whole list, scalars overwrite when present.
#[derive(Debug, Clone, Default)]
pub struct DialogStateUpdate {
    pub phase: Option<DialogPhase>,
    pub intent: Option<Intent>,
    pub collected_entities: Option<HashMap<String, serde_json::Value>>,
    pub metadata: Option<HashMap<String, serde_json::Value>>,
    pub needed_entities: Option<Vec<EntityType>>,
    pub pending_action: Option<PendingAction>,
    pub context: Option<HashMap<String, serde_json::Value>>,
    pub expires_in_hours: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialogStateStatus {
    pub has_active_state: bool,
    pub state: Option<DialogState>,
    pub is_follow_up_likely: bool,
}

/// Owns every read and mutation of dialog state rows.
pub struct DialogStateManager {
    store: Arc<dyn DialogStore>,
    default_expiry_hours: i64,
}

impl DialogStateManager {
    pub fn new(store: Arc<dyn DialogStore>, default_expiry_hours: i64) -> Self {
        Self {
            store,
            default_expiry_hours,
        }
    }

    /// Create (or replace) the state for a session. At most one row per
    /// session exists; a new conversation overwrites a stale one.
    pub async fn create_state(
        &self,
        user_id: i64,
        session_id: &str,
        intent: Intent,
        collected_entities: HashMap<String, serde_json::Value>,
        needed_entities: Vec<EntityType>,
    ) -> Result<DialogState> {
        let mut state = DialogState::new(user_id, session_id, self.default_expiry_hours);
        state.phase = DialogPhase::CollectingInfo;
        state.intent = Some(intent);
        state.collected_entities = collected_entities;
        state.needed_entities = needed_entities;
        self.store.put(state.clone()).await?;
        info!(session_id, intent = %intent, "dialog state created");
        Ok(state)
    }

    /// Load the active state for a session. Expired or completed rows are
    /// deleted on sight and reported as absent.
    pub async fn get_active_state(&self, session_id: &str) -> Result<Option<DialogState>> {
        let Some(state) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        let now = Utc::now();
        if state.is_expired(now) || state.phase == DialogPhase::Completed {
            debug!(session_id, phase = state.phase.as_str(), "dropping inactive dialog state");
            self.store.remove(session_id).await?;
            return Ok(None);
        }
        Ok(Some(state))
    }

    pub async fn update_state(
        &self,
        session_id: &str,
        patch: DialogStateUpdate,
    ) -> Result<Option<DialogState>> {
        let Some(mut state) = self.store.get(session_id).await? else {
            return Ok(None);
        };

        if let Some(phase) = patch.phase {
            state.phase = phase;
        }
        if let Some(intent) = patch.intent {
            state.intent = Some(intent);
        }
        if let Some(entities) = patch.collected_entities {
            for (key, value) in entities {
                state.collected_entities.insert(key, value);
            }
        }
        if let Some(metadata) = patch.metadata {
            for (key, value) in metadata {
                state.metadata.insert(key, value);
            }
        }
        if let Some(needed) = patch.needed_entities {
            state.needed_entities = needed;
        }
        if let Some(pending) = patch.pending_action {
            state.pending_action = Some(pending);
        }
        if let Some(context) = patch.context {
            for (key, value) in context {
                state.context.insert(key, value);
            }
        }
        if let Some(hours) = patch.expires_in_hours {
            let hours = hours.clamp(
                hearth_core::dialog::MIN_EXPIRY_HOURS,
                hearth_core::dialog::MAX_EXPIRY_HOURS,
            );
            state.expires_at = Utc::now() + ChronoDuration::hours(hours);
        }
        state.touch();

        self.store.put(state.clone()).await?;
        Ok(Some(state))
    }

    /// Store one collected entity. Entity keys are type labels, so legacy
    /// `_metadata_*` keys already in the map are never overwritten here.
    pub async fn add_entity(
        &self,
        session_id: &str,
        entity_type: EntityType,
        value: serde_json::Value,
    ) -> Result<Option<DialogState>> {
        let Some(mut state) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        state
            .collected_entities
            .insert(entity_type.as_str().to_string(), value);
        state.touch();
        self.store.put(state.clone()).await?;
        Ok(Some(state))
    }

    /// Attach an auxiliary identifier (rate_card_id, subcategory_id, …).
    pub async fn add_metadata(
        &self,
        session_id: &str,
        key: &str,
        value: serde_json::Value,
    ) -> Result<Option<DialogState>> {
        let Some(mut state) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        state.metadata.insert(key.to_string(), value);
        state.touch();
        self.store.put(state.clone()).await?;
        Ok(Some(state))
    }

    pub async fn remove_needed_entity(
        &self,
        session_id: &str,
        entity_type: EntityType,
    ) -> Result<Option<DialogState>> {
        let Some(mut state) = self.store.get(session_id).await? else {
            return Ok(None);
        };
        state.needed_entities.retain(|needed| *needed != entity_type);
        state.touch();
        self.store.put(state.clone()).await?;
        Ok(Some(state))
    }

    pub async fn clear_state(&self, session_id: &str) -> Result<bool> {
        let removed = self.store.remove(session_id).await?;
        if removed {
            info!(session_id, "dialog state cleared");
        }
        Ok(removed)
    }

    pub async fn get_state_status(&self, session_id: &str) -> Result<DialogStateStatus> {
        let state = self.get_active_state(session_id).await?;
        let is_follow_up_likely = state
            .as_ref()
            .map(|state| {
                matches!(
                    state.phase,
                    DialogPhase::CollectingInfo | DialogPhase::AwaitingConfirmation
                )
            })
            .unwrap_or(false);
        Ok(DialogStateStatus {
            has_active_state: state.is_some(),
            state,
            is_follow_up_likely,
        })
    }

    pub async fn is_follow_up_response(
        &self,
        text: &str,
        session_id: &str,
    ) -> Result<FollowUpDetection> {
        let state = self.get_active_state(session_id).await?;
        Ok(detect_follow_up(text, state.as_ref()))
    }

    /// Periodic sweep deleting expired rows. Runs until the handle is
    /// dropped/aborted.
    pub fn spawn_expiry_sweeper(
        store: Arc<dyn DialogStore>,
        interval: Duration,
    ) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                match store.remove_expired(Utc::now()).await {
                    Ok(0) => {}
                    Ok(removed) => info!(removed, "expired dialog states swept"),
                    Err(error) => tracing::warn!(%error, "dialog state sweep failed"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDialogStore;

    fn manager() -> DialogStateManager {
        DialogStateManager::new(Arc::new(MemoryDialogStore::new()), 24)
    }

    #[tokio::test]
    async fn create_and_fetch_active_state() -> Result<()> {
        let manager = manager();
        manager
            .create_state(
                1,
                "sess",
                Intent::BookingManagement,
                HashMap::from([("service_type".to_string(), serde_json::json!("ac"))]),
                vec![EntityType::Date, EntityType::Time],
            )
            .await?;

        let state = manager.get_active_state("sess").await?.unwrap();
        assert_eq!(state.phase, DialogPhase::CollectingInfo);
        assert!(state.needs_more_info());
        assert_eq!(state.expected_entity(), Some(EntityType::Date));
        Ok(())
    }

    #[tokio::test]
    async fn add_entity_and_deplete_needed_list() -> Result<()> {
        let manager = manager();
        manager
            .create_state(
                1,
                "sess",
                Intent::BookingManagement,
                HashMap::new(),
                vec![EntityType::Date],
            )
            .await?;

        manager
            .add_entity("sess", EntityType::Date, serde_json::json!("2025-10-10"))
            .await?;
        let state = manager
            .remove_needed_entity("sess", EntityType::Date)
            .await?
            .unwrap();
        assert_eq!(state.collected_entities["date"], "2025-10-10");
        assert!(state.needed_entities.is_empty());
        assert!(!state.needs_more_info());
        Ok(())
    }

    #[tokio::test]
    async fn update_merges_context_and_replaces_needed() -> Result<()> {
        let manager = manager();
        manager
            .create_state(
                1,
                "sess",
                Intent::BookingManagement,
                HashMap::new(),
                vec![EntityType::Date, EntityType::Time],
            )
            .await?;

        manager
            .update_state(
                "sess",
                DialogStateUpdate {
                    context: Some(HashMap::from([(
                        "last_question".to_string(),
                        serde_json::json!("What date works?"),
                    )])),
                    ..Default::default()
                },
            )
            .await?;
        let state = manager
            .update_state(
                "sess",
                DialogStateUpdate {
                    needed_entities: Some(vec![EntityType::Time]),
                    context: Some(HashMap::from([(
                        "attempt_count".to_string(),
                        serde_json::json!(1),
                    )])),
                    ..Default::default()
                },
            )
            .await?
            .unwrap();

        // context merged, needed replaced
        assert_eq!(state.context["last_question"], "What date works?");
        assert_eq!(state.context["attempt_count"], 1);
        assert_eq!(state.needed_entities, vec![EntityType::Time]);
        Ok(())
    }

    #[tokio::test]
    async fn expired_state_reads_as_absent_and_is_deleted() -> Result<()> {
        let store = Arc::new(MemoryDialogStore::new());
        let manager = DialogStateManager::new(Arc::clone(&store) as Arc<dyn DialogStore>, 24);

        let mut state = DialogState::new(1, "sess", 1);
        state.phase = DialogPhase::CollectingInfo;
        state.expires_at = Utc::now() - ChronoDuration::hours(1);
        store.put(state).await?;

        assert!(manager.get_active_state("sess").await?.is_none());
        // The expired row was removed, not just filtered.
        assert!(store.get("sess").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn completed_state_is_not_active() -> Result<()> {
        let manager = manager();
        manager
            .create_state(1, "sess", Intent::BookingManagement, HashMap::new(), vec![])
            .await?;
        manager
            .update_state(
                "sess",
                DialogStateUpdate {
                    phase: Some(DialogPhase::Completed),
                    ..Default::default()
                },
            )
            .await?;
        assert!(manager.get_active_state("sess").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn status_reports_follow_up_likelihood() -> Result<()> {
        let manager = manager();
        let status = manager.get_state_status("sess").await?;
        assert!(!status.has_active_state);
        assert!(!status.is_follow_up_likely);

        manager
            .create_state(
                1,
                "sess",
                Intent::BookingManagement,
                HashMap::new(),
                vec![EntityType::Time],
            )
            .await?;
        let status = manager.get_state_status("sess").await?;
        assert!(status.has_active_state);
        assert!(status.is_follow_up_likely);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn sweeper_removes_expired_rows() -> Result<()> {
        let store = Arc::new(MemoryDialogStore::new());
        let mut stale = DialogState::new(1, "stale", 1);
        stale.expires_at = Utc::now() - ChronoDuration::hours(2);
        store.put(stale).await?;

        let handle = DialogStateManager::spawn_expiry_sweeper(
            Arc::clone(&store) as Arc<dyn DialogStore>,
            Duration::from_secs(60),
        );
        // The first tick fires immediately; give the task a chance to run.
        tokio::time::sleep(Duration::from_millis(10)).await;
        handle.abort();

        assert!(store.get("stale").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn follow_up_detection_reads_current_state() -> Result<()> {
        let manager = manager();
        manager
            .create_state(
                1,
                "sess",
                Intent::BookingManagement,
                HashMap::new(),
                vec![EntityType::Time],
            )
            .await?;
        manager
            .update_state(
                "sess",
                DialogStateUpdate {
                    phase: Some(DialogPhase::AwaitingConfirmation),
                    pending_action: Some(PendingAction {
                        kind: hearth_core::PendingActionKind::CreateBooking,
                        params: serde_json::json!({}),
                    }),
                    ..Default::default()
                },
            )
            .await?;

        let detection = manager.is_follow_up_response("yes", "sess").await?;
        assert!(detection.is_follow_up);
        Ok(())
    }
}
