//! Raw model-run records and the normalized events derived from them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One loosely-typed record emitted by a model-driven agent run.
///
/// The shapes follow the converse-stream layout: wrapper events live under
/// `"event"`, streamed text under `"data"`, in-flight tool input under
/// `"current_tool_use"` and the cycle marker under `"start_event_loop"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RawEvent(pub Value);

impl RawEvent {
    pub fn loop_start() -> Self {
        Self(json!({ "start_event_loop": true }))
    }

    pub fn message_start() -> Self {
        Self(json!({ "event": { "messageStart": { "role": "assistant" } } }))
    }

    pub fn tool_use_start(tool_use_id: &str, name: &str) -> Self {
        Self(json!({
            "event": {
                "contentBlockStart": {
                    "start": { "toolUse": { "toolUseId": tool_use_id, "name": name } }
                }
            }
        }))
    }

    pub fn tool_use_input(tool_use_id: &str, name: &str, fragment: &str) -> Self {
        Self(json!({
            "current_tool_use": { "toolUseId": tool_use_id, "name": name, "input": fragment }
        }))
    }

    pub fn content_block_stop(index: u32) -> Self {
        Self(json!({ "event": { "contentBlockStop": { "contentBlockIndex": index } } }))
    }

    pub fn text(data: &str) -> Self {
        Self(json!({ "data": data }))
    }

    pub fn message_stop(stop_reason: &str) -> Self {
        Self(json!({ "event": { "messageStop": { "stopReason": stop_reason } } }))
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

impl From<Value> for RawEvent {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Normalized event forwarded to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    ToolCallStart {
        tool_call_id: String,
        tool_name: String,
    },
    /// Fragments of one call concatenate, in arrival order, to its JSON input.
    ToolCallInputDelta {
        tool_call_id: String,
        input_fragment: String,
    },
    ToolCallComplete {
        tool_call_id: String,
    },
    TextChunk {
        text: String,
    },
    LoopStart,
}

impl StreamEvent {
    /// The caller-facing record for this event.
    ///
    /// Text goes out as `{"data": ...}`, the loop marker as
    /// `{"start_event_loop": true}`, tool events as `{"event": ...}`.
    pub fn to_record(&self) -> Value {
        match self {
            StreamEvent::TextChunk { text } => json!({ "data": text }),
            StreamEvent::LoopStart => json!({ "start_event_loop": true }),
            other => json!({ "event": other }),
        }
    }

    /// The record serialized as one newline-terminated JSON line.
    pub fn to_ndjson(&self) -> String {
        let mut line = self.to_record().to_string();
        line.push('\n');
        line
    }
}

/// Why a raw record produced no event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IgnoreReason {
    /// A shape the normalizer does not know; kept for forward compatibility.
    Unrecognized,
    /// Tool input arrived while no tool call was open.
    InputOutsideToolCall,
    /// A block stop that does not close a tool call (e.g. the end of a text block).
    StopOutsideToolCall,
}

/// Result of classifying one raw record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classified {
    Event(StreamEvent),
    Ignored(IgnoreReason),
}

impl Classified {
    pub fn into_event(self) -> Option<StreamEvent> {
        match self {
            Classified::Event(event) => Some(event),
            Classified::Ignored(_) => None,
        }
    }
}
