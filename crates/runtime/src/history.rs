//! Message persistence implementations of the [`MessageStore`] collaborator.
//!
//! [`JsonlMessageStore`] appends one JSON line per message to a per-session
//! file, a thin transcript the surrounding application can replace with its
//! database-backed store. [`MemoryMessageStore`] backs tests and ephemeral
//! deployments.

use std::collections::HashMap;
use std::fs;
use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use async_trait::async_trait;
use tokio::sync::RwLock;

use hearth_core::{CollabError, ConversationMessage, MessageStore};

pub struct MemoryMessageStore {
    sessions: RwLock<HashMap<String, Vec<ConversationMessage>>>,
}

impl MemoryMessageStore {
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for MemoryMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MessageStore for MemoryMessageStore {
    async fn append(&self, message: ConversationMessage) -> Result<(), CollabError> {
        self.sessions
            .write()
            .await
            .entry(message.session_id.clone())
            .or_default()
            .push(message);
        Ok(())
    }

    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, CollabError> {
        let sessions = self.sessions.read().await;
        let messages = sessions.get(session_id).cloned().unwrap_or_default();
        let skip = messages.len().saturating_sub(limit);
        Ok(messages.into_iter().skip(skip).collect())
    }
}

/// Append-only JSONL transcript, one file per session.
pub struct JsonlMessageStore {
    dir: PathBuf,
}

impl JsonlMessageStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn session_file(&self, session_id: &str) -> PathBuf {
        // Session ids are generated by the core, but sanitize anyway.
        let safe: String = session_id
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.dir.join(format!("{safe}.jsonl"))
    }
}

#[async_trait]
impl MessageStore for JsonlMessageStore {
    async fn append(&self, message: ConversationMessage) -> Result<(), CollabError> {
        fs::create_dir_all(&self.dir)
            .map_err(|error| CollabError::Unavailable(error.to_string()))?;
        let line = serde_json::to_string(&message)
            .map_err(|error| CollabError::Rejected(error.to_string()))?;
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.session_file(&message.session_id))
            .map_err(|error| CollabError::Unavailable(error.to_string()))?;
        writeln!(file, "{line}").map_err(|error| CollabError::Unavailable(error.to_string()))?;
        Ok(())
    }

    async fn recent(
        &self,
        session_id: &str,
        limit: usize,
    ) -> Result<Vec<ConversationMessage>, CollabError> {
        let path = self.session_file(session_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file =
            fs::File::open(&path).map_err(|error| CollabError::Unavailable(error.to_string()))?;
        let reader = BufReader::new(file);

        let mut messages: Vec<ConversationMessage> = reader
            .lines()
            .filter_map(|line| {
                let line = line.ok()?;
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    return None;
                }
                serde_json::from_str(trimmed).ok()
            })
            .collect();

        if messages.len() > limit {
            let skip = messages.len() - limit;
            messages.drain(..skip);
        }
        Ok(messages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_caps_recent_to_limit() {
        let store = MemoryMessageStore::new();
        for index in 0..6 {
            store
                .append(ConversationMessage::user(1, "sess", format!("m{index}")))
                .await
                .unwrap();
        }
        let recent = store.recent("sess", 4).await.unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].text, "m2");
        assert_eq!(recent[3].text, "m5");
    }

    #[tokio::test]
    async fn jsonl_store_roundtrips_messages() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonlMessageStore::new(dir.path());

        store
            .append(ConversationMessage::user(1, "sess-1", "hello"))
            .await
            .unwrap();
        store
            .append(ConversationMessage::assistant(1, "sess-1", "hi there"))
            .await
            .unwrap();

        let recent = store.recent("sess-1", 10).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].text, "hello");
        assert_eq!(recent[1].role, hearth_core::MessageRole::Assistant);

        // Unknown sessions read back empty.
        assert!(store.recent("other", 10).await.unwrap().is_empty());
    }
}
