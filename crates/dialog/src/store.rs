use std::collections::HashMap;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use hearth_core::DialogState;

/// Persistence seam for dialog states. One row per session, unique on
/// `session_id`, indexed on `expires_at` for the sweep.
#[async_trait]
pub trait DialogStore: Send + Sync {
    async fn get(&self, session_id: &str) -> Result<Option<DialogState>>;
    async fn put(&self, state: DialogState) -> Result<()>;
    async fn remove(&self, session_id: &str) -> Result<bool>;
    /// Delete every row with `expires_at < now`; returns how many went.
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize>;
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryDialogStore {
    states: RwLock<HashMap<String, DialogState>>,
}

impl MemoryDialogStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DialogStore for MemoryDialogStore {
    async fn get(&self, session_id: &str) -> Result<Option<DialogState>> {
        Ok(self.states.read().await.get(session_id).cloned())
    }

    async fn put(&self, state: DialogState) -> Result<()> {
        self.states
            .write()
            .await
            .insert(state.session_id.clone(), state);
        Ok(())
    }

    async fn remove(&self, session_id: &str) -> Result<bool> {
        Ok(self.states.write().await.remove(session_id).is_some())
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        let mut states = self.states.write().await;
        let before = states.len();
        states.retain(|_, state| !state.is_expired(now));
        Ok(before - states.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[tokio::test]
    async fn put_get_remove_roundtrip() -> Result<()> {
        let store = MemoryDialogStore::new();
        let state = DialogState::new(1, "s1", 24);
        store.put(state.clone()).await?;

        let loaded = store.get("s1").await?.unwrap();
        assert_eq!(loaded.user_id, 1);

        assert!(store.remove("s1").await?);
        assert!(store.get("s1").await?.is_none());
        assert!(!store.remove("s1").await?);
        Ok(())
    }

    #[tokio::test]
    async fn remove_expired_sweeps_only_stale_rows() -> Result<()> {
        let store = MemoryDialogStore::new();
        let mut stale = DialogState::new(1, "old", 1);
        stale.expires_at = Utc::now() - Duration::hours(1);
        store.put(stale).await?;
        store.put(DialogState::new(2, "fresh", 24)).await?;

        let removed = store.remove_expired(Utc::now()).await?;
        assert_eq!(removed, 1);
        assert!(store.get("old").await?.is_none());
        assert!(store.get("fresh").await?.is_some());
        Ok(())
    }
}
