//! Conversation memory.
//!
//! Prior turns are loaded per (actor, session) before a run, and every message
//! appended during the run is saved back through [`MemoryHook`].

mod sqlite;

pub use sqlite::SqliteMemoryStore;

use crate::agent::{ChatMessage, Role, TranscriptObserver};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info};

/// Where one conversation lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationKey {
    pub memory_id: String,
    pub actor_id: String,
    pub session_id: String,
}

impl ConversationKey {
    pub fn new(memory_id: &str, actor_id: &str, session_id: &str) -> Self {
        Self {
            memory_id: memory_id.to_string(),
            actor_id: actor_id.to_string(),
            session_id: session_id.to_string(),
        }
    }
}

/// Persistent conversation history.
#[async_trait]
pub trait ConversationMemory: Send + Sync {
    /// The last `last_k_turns` turns in chronological order. A turn starts at a
    /// user message.
    async fn load(&self, key: &ConversationKey, last_k_turns: usize) -> Result<Vec<ChatMessage>>;

    /// Append `(text, role)` pairs to the conversation.
    async fn save(&self, key: &ConversationKey, messages: &[(String, Role)]) -> Result<()>;
}

/// Transcript observer that persists each appended message.
///
/// Only the first text item is saved; messages without text (tool results)
/// are skipped.
pub struct MemoryHook {
    memory: Arc<dyn ConversationMemory>,
    key: ConversationKey,
}

impl MemoryHook {
    pub fn new(memory: Arc<dyn ConversationMemory>, key: ConversationKey) -> Self {
        Self { memory, key }
    }
}

#[async_trait]
impl TranscriptObserver for MemoryHook {
    fn name(&self) -> &str {
        "memory"
    }

    async fn on_message_added(&self, messages: &[ChatMessage]) -> Result<()> {
        let Some(last) = messages.last() else {
            return Ok(());
        };
        let Some(text) = last.first_text() else {
            debug!("Message has no text content, not saving to memory");
            return Ok(());
        };

        self.memory
            .save(&self.key, &[(text.to_string(), last.role)])
            .await?;

        info!(
            "Saved {} message to memory (session {}, {} chars)",
            last.role,
            self.key.session_id,
            text.len()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::ContentBlock;

    #[tokio::test]
    async fn test_hook_saves_first_text_with_role() {
        let store = Arc::new(SqliteMemoryStore::in_memory().unwrap());
        let key = ConversationKey::new("default", "alice", "s1");
        let hook = MemoryHook::new(store.clone(), key.clone());

        let messages = vec![
            ChatMessage::user("What is the cache hit rate?"),
            ChatMessage {
                role: Role::Assistant,
                content: vec![
                    ContentBlock::Text {
                        text: "Your cache hit rate is 92%.".to_string(),
                    },
                    ContentBlock::Text {
                        text: "ignored".to_string(),
                    },
                ],
            },
        ];
        hook.on_message_added(&messages[..1]).await.unwrap();
        hook.on_message_added(&messages).await.unwrap();

        let loaded = store.load(&key, 10).await.unwrap();
        assert_eq!(
            loaded,
            vec![
                ChatMessage::user("What is the cache hit rate?"),
                ChatMessage::assistant("Your cache hit rate is 92%."),
            ]
        );
    }

    #[tokio::test]
    async fn test_hook_skips_tool_results() {
        let store = Arc::new(SqliteMemoryStore::in_memory().unwrap());
        let key = ConversationKey::new("default", "alice", "s1");
        let hook = MemoryHook::new(store.clone(), key.clone());

        let tool_result = ChatMessage {
            role: Role::User,
            content: vec![ContentBlock::ToolResult {
                tool_use_id: "t1".to_string(),
                content: "92".to_string(),
                is_error: false,
            }],
        };
        hook.on_message_added(&[tool_result]).await.unwrap();

        assert!(store.load(&key, 10).await.unwrap().is_empty());
    }
}
