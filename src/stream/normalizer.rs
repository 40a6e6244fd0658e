//! Classification of raw agent-run records into [`StreamEvent`]s.

use super::event::{Classified, IgnoreReason, RawEvent, StreamEvent};
use serde_json::Value;

/// The tool call currently open in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
struct OpenToolCall {
    id: String,
    name: String,
}

/// Turns raw records of one agent run into normalized events.
///
/// Holds only the "tool call open" flag (plus the open call's identity, which
/// block-stop records do not repeat). One normalizer per run.
#[derive(Debug, Default)]
pub struct Normalizer {
    open: Option<OpenToolCall>,
}

impl Normalizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a tool call is currently open.
    pub fn tool_active(&self) -> bool {
        self.open.is_some()
    }

    /// Classify one raw record, updating the open-call flag.
    pub fn classify(&mut self, raw: &RawEvent) -> Classified {
        let value = raw.as_value();

        if let Some(event) = value.get("event") {
            return self.classify_wrapped(event);
        }
        if value.get("start_event_loop").is_some() {
            return Classified::Event(StreamEvent::LoopStart);
        }
        if let Some(tool_use) = value.get("current_tool_use") {
            return self.classify_tool_input(tool_use);
        }
        if let Some(data) = value.get("data") {
            return match data {
                Value::String(text) => Classified::Event(StreamEvent::TextChunk { text: text.clone() }),
                _ => Classified::Ignored(IgnoreReason::Unrecognized),
            };
        }

        Classified::Ignored(IgnoreReason::Unrecognized)
    }

    fn classify_wrapped(&mut self, event: &Value) -> Classified {
        if let Some(tool_use) = event
            .get("contentBlockStart")
            .and_then(|start| start.get("start"))
            .and_then(|start| start.get("toolUse"))
        {
            let open = OpenToolCall {
                id: string_field(tool_use, "toolUseId"),
                name: string_field(tool_use, "name"),
            };
            let started = StreamEvent::ToolCallStart {
                tool_call_id: open.id.clone(),
                tool_name: open.name.clone(),
            };
            self.open = Some(open);
            return Classified::Event(started);
        }

        if event.get("contentBlockStop").is_some() {
            return match self.open.take() {
                Some(open) => Classified::Event(StreamEvent::ToolCallComplete {
                    tool_call_id: open.id,
                }),
                None => Classified::Ignored(IgnoreReason::StopOutsideToolCall),
            };
        }

        Classified::Ignored(IgnoreReason::Unrecognized)
    }

    fn classify_tool_input(&self, tool_use: &Value) -> Classified {
        let Some(open) = &self.open else {
            return Classified::Ignored(IgnoreReason::InputOutsideToolCall);
        };

        let tool_call_id = tool_use
            .get("toolUseId")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| open.id.clone());

        let input_fragment = match tool_use.get("input") {
            Some(Value::String(fragment)) => fragment.clone(),
            Some(Value::Null) | None => String::new(),
            Some(other) => other.to_string(),
        };

        Classified::Event(StreamEvent::ToolCallInputDelta {
            tool_call_id,
            input_fragment,
        })
    }
}

fn string_field(value: &Value, key: &str) -> String {
    value
        .get(key)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn classify_all(records: &[RawEvent]) -> Vec<StreamEvent> {
        let mut normalizer = Normalizer::new();
        records
            .iter()
            .filter_map(|r| normalizer.classify(r).into_event())
            .collect()
    }

    #[test]
    fn test_tool_call_sequence() {
        let events = classify_all(&[
            RawEvent::loop_start(),
            RawEvent::text("Checking. "),
            RawEvent::tool_use_start("t1", "run_select_query"),
            RawEvent::tool_use_input("t1", "run_select_query", "{\"query\":"),
            RawEvent::tool_use_input("t1", "run_select_query", "\"SELECT 1\"}"),
            RawEvent::content_block_stop(1),
            RawEvent::text("Done."),
        ]);

        assert_eq!(
            events,
            vec![
                StreamEvent::LoopStart,
                StreamEvent::TextChunk { text: "Checking. ".to_string() },
                StreamEvent::ToolCallStart {
                    tool_call_id: "t1".to_string(),
                    tool_name: "run_select_query".to_string(),
                },
                StreamEvent::ToolCallInputDelta {
                    tool_call_id: "t1".to_string(),
                    input_fragment: "{\"query\":".to_string(),
                },
                StreamEvent::ToolCallInputDelta {
                    tool_call_id: "t1".to_string(),
                    input_fragment: "\"SELECT 1\"}".to_string(),
                },
                StreamEvent::ToolCallComplete { tool_call_id: "t1".to_string() },
                StreamEvent::TextChunk { text: "Done.".to_string() },
            ]
        );
    }

    #[test]
    fn test_input_without_open_call_is_ignored() {
        let mut normalizer = Normalizer::new();
        let classified = normalizer.classify(&RawEvent::tool_use_input("t9", "run_select_query", "{}"));
        assert_eq!(classified, Classified::Ignored(IgnoreReason::InputOutsideToolCall));
        assert!(!normalizer.tool_active());
    }

    #[test]
    fn test_text_block_stop_is_ignored() {
        let mut normalizer = Normalizer::new();
        assert_eq!(
            normalizer.classify(&RawEvent::content_block_stop(0)),
            Classified::Ignored(IgnoreReason::StopOutsideToolCall)
        );
    }

    #[test]
    fn test_unknown_shapes_are_dropped() {
        let events = classify_all(&[
            RawEvent::message_start(),
            RawEvent::from(json!({ "init_event_loop": true })),
            RawEvent::from(json!({ "event": { "metadata": { "usage": {} } } })),
            RawEvent::message_stop("end_turn"),
            RawEvent::from(json!({ "data": 42 })),
        ]);
        assert!(events.is_empty());
    }

    #[test]
    fn test_start_without_tool_use_is_not_a_tool_call() {
        let mut normalizer = Normalizer::new();
        let raw = RawEvent::from(json!({ "event": { "contentBlockStart": { "start": {} } } }));
        assert_eq!(normalizer.classify(&raw), Classified::Ignored(IgnoreReason::Unrecognized));
        assert!(!normalizer.tool_active());
    }

    #[test]
    fn test_delta_without_id_uses_open_call() {
        let mut normalizer = Normalizer::new();
        normalizer.classify(&RawEvent::tool_use_start("t2", "calculator"));
        let raw = RawEvent::from(json!({ "current_tool_use": { "input": "{}" } }));
        assert_eq!(
            normalizer.classify(&raw),
            Classified::Event(StreamEvent::ToolCallInputDelta {
                tool_call_id: "t2".to_string(),
                input_fragment: "{}".to_string(),
            })
        );
    }
}
