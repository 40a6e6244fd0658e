//! SQLite-backed conversation memory.

use super::{ConversationKey, ConversationMemory};
use crate::agent::{ChatMessage, Role};
use crate::error::{Result, StreamLensError};
use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS conversation_events (
        memory_id TEXT NOT NULL,
        actor_id TEXT NOT NULL,
        session_id TEXT NOT NULL,
        seq INTEGER PRIMARY KEY AUTOINCREMENT,
        role TEXT NOT NULL,
        content TEXT NOT NULL,
        created_at TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_conversation_events_key
        ON conversation_events(memory_id, actor_id, session_id, seq);
"#;

/// SQLite conversation store.
pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
}

impl SqliteMemoryStore {
    /// Open (or create) the memory database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite memory store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| StreamLensError::memory(format!("Failed to acquire lock: {}", e)))
    }
}

#[async_trait]
impl ConversationMemory for SqliteMemoryStore {
    #[instrument(skip(self))]
    async fn load(&self, key: &ConversationKey, last_k_turns: usize) -> Result<Vec<ChatMessage>> {
        if last_k_turns == 0 {
            return Ok(Vec::new());
        }

        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT role, content FROM conversation_events
            WHERE memory_id = ?1 AND actor_id = ?2 AND session_id = ?3
            ORDER BY seq DESC
            "#,
        )?;

        let rows = stmt.query_map(
            params![key.memory_id, key.actor_id, key.session_id],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
        )?;

        // Walk backwards until k user messages (turn starts) have been seen.
        let mut messages = Vec::new();
        let mut turns = 0;
        for row in rows {
            let (role, content) = row?;
            let role: Role = role.parse().map_err(|e: String| StreamLensError::memory(e))?;
            messages.push(ChatMessage::text(role, content));
            if role == Role::User {
                turns += 1;
                if turns == last_k_turns {
                    break;
                }
            }
        }
        messages.reverse();

        debug!(
            "Loaded {} messages ({} turns) for session {}",
            messages.len(),
            turns,
            key.session_id
        );
        Ok(messages)
    }

    #[instrument(skip(self, messages))]
    async fn save(&self, key: &ConversationKey, messages: &[(String, Role)]) -> Result<()> {
        let conn = self.lock()?;
        let tx = conn.unchecked_transaction()?;
        let now = Utc::now().to_rfc3339();

        for (content, role) in messages {
            tx.execute(
                r#"
                INSERT INTO conversation_events
                (memory_id, actor_id, session_id, role, content, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                "#,
                params![
                    key.memory_id,
                    key.actor_id,
                    key.session_id,
                    role.as_str(),
                    content,
                    now
                ],
            )?;
        }

        tx.commit()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seed(store: &SqliteMemoryStore, key: &ConversationKey, turns: usize) {
        for i in 0..turns {
            store
                .save(
                    key,
                    &[
                        (format!("question {}", i), Role::User),
                        (format!("answer {}", i), Role::Assistant),
                    ],
                )
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_load_last_k_turns_in_order() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let key = ConversationKey::new("default", "alice", "s1");
        seed(&store, &key, 5).await;

        let loaded = store.load(&key, 2).await.unwrap();
        assert_eq!(
            loaded,
            vec![
                ChatMessage::user("question 3"),
                ChatMessage::assistant("answer 3"),
                ChatMessage::user("question 4"),
                ChatMessage::assistant("answer 4"),
            ]
        );

        assert!(store.load(&key, 0).await.unwrap().is_empty());
        assert_eq!(store.load(&key, 50).await.unwrap().len(), 10);
    }

    #[tokio::test]
    async fn test_sessions_are_isolated() {
        let store = SqliteMemoryStore::in_memory().unwrap();
        let alice = ConversationKey::new("default", "alice", "s1");
        let bob = ConversationKey::new("default", "bob", "s1");
        seed(&store, &alice, 1).await;

        assert!(store.load(&bob, 20).await.unwrap().is_empty());
        assert_eq!(store.load(&alice, 20).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memory.db");
        let key = ConversationKey::new("default", "alice", "s1");

        {
            let store = SqliteMemoryStore::new(&path).unwrap();
            seed(&store, &key, 1).await;
        }

        let store = SqliteMemoryStore::new(&path).unwrap();
        assert_eq!(store.load(&key, 20).await.unwrap().len(), 2);
    }
}
