//! Provider-agnostic conversation messages and the run transcript.

use crate::error::Result;
use async_trait::async_trait;
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, warn};

/// Author of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One item of message content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

/// A message in an agent transcript.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: Vec<ContentBlock>,
}

impl ChatMessage {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: vec![ContentBlock::Text { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::text(Role::User, text)
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self::text(Role::Assistant, text)
    }

    /// The first text item, if the message has one.
    pub fn first_text(&self) -> Option<&str> {
        self.content.iter().find_map(|block| match block {
            ContentBlock::Text { text } => Some(text.as_str()),
            _ => None,
        })
    }
}

/// Notified after every message appended to a transcript.
#[async_trait]
pub trait TranscriptObserver: Send + Sync {
    fn name(&self) -> &str;

    /// `messages` is the whole transcript; the new message is last.
    async fn on_message_added(&self, messages: &[ChatMessage]) -> Result<()>;
}

/// Messages of one agent run plus the observers watching it.
#[derive(Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    observers: Vec<Arc<dyn TranscriptObserver>>,
}

impl Transcript {
    /// Start from prior history. History is not replayed to observers.
    pub fn new(history: Vec<ChatMessage>, observers: Vec<Arc<dyn TranscriptObserver>>) -> Self {
        Self {
            messages: history,
            observers,
        }
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Append a message, then notify observers in order.
    ///
    /// An observer that fails or panics is logged and skipped; the append
    /// itself always succeeds.
    pub async fn append(&mut self, message: ChatMessage) {
        self.messages.push(message);

        for observer in &self.observers {
            let outcome = AssertUnwindSafe(observer.on_message_added(&self.messages))
                .catch_unwind()
                .await;
            match outcome {
                Ok(Ok(())) => debug!("Observer {} handled message", observer.name()),
                Ok(Err(e)) => warn!("Observer {} failed: {}", observer.name(), e),
                Err(_) => warn!("Observer {} panicked", observer.name()),
            }
        }
    }
}

impl std::fmt::Debug for Transcript {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transcript")
            .field("messages", &self.messages.len())
            .field(
                "observers",
                &self.observers.iter().map(|o| o.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StreamLensError;
    use std::sync::Mutex;

    struct Recording {
        seen: Mutex<Vec<usize>>,
    }

    #[async_trait]
    impl TranscriptObserver for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        async fn on_message_added(&self, messages: &[ChatMessage]) -> Result<()> {
            self.seen.lock().unwrap().push(messages.len());
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl TranscriptObserver for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn on_message_added(&self, _messages: &[ChatMessage]) -> Result<()> {
            Err(StreamLensError::memory("store offline".to_string()))
        }
    }

    struct Panicking;

    #[async_trait]
    impl TranscriptObserver for Panicking {
        fn name(&self) -> &str {
            "panicking"
        }

        async fn on_message_added(&self, _messages: &[ChatMessage]) -> Result<()> {
            panic!("observer bug");
        }
    }

    #[tokio::test]
    async fn test_observers_run_in_order_despite_failures() {
        let recording = Arc::new(Recording {
            seen: Mutex::new(Vec::new()),
        });
        let mut transcript = Transcript::new(
            vec![ChatMessage::user("earlier")],
            vec![Arc::new(Failing), Arc::new(Panicking), recording.clone()],
        );

        transcript.append(ChatMessage::user("hi")).await;
        transcript.append(ChatMessage::assistant("hello")).await;

        assert_eq!(transcript.messages().len(), 3);
        assert_eq!(*recording.seen.lock().unwrap(), vec![2, 3]);
    }

    #[test]
    fn test_first_text_skips_tool_blocks() {
        let message = ChatMessage {
            role: Role::Assistant,
            content: vec![
                ContentBlock::ToolUse {
                    id: "t1".to_string(),
                    name: "calculator".to_string(),
                    input: serde_json::json!({}),
                },
                ContentBlock::Text {
                    text: "answer".to_string(),
                },
            ],
        };
        assert_eq!(message.first_text(), Some("answer"));
    }

    #[test]
    fn test_role_round_trip() {
        assert_eq!("Assistant".parse::<Role>().unwrap(), Role::Assistant);
        assert_eq!(Role::User.to_string(), "user");
        assert!("tool".parse::<Role>().is_err());
    }
}
