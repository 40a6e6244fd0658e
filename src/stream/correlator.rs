//! Reassembly of streamed SQL tool calls and their audit writes.

use super::event::StreamEvent;
use crate::audit::{AuditRecord, AuditSink};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Name of the tool-server tool that runs a SQL select query.
pub const SQL_TOOL_NAME: &str = "run_select_query";

/// Accumulator for the one tool call currently streaming in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingToolCall {
    pub tool_call_id: String,
    pub name: String,
    /// Raw concatenation of the call's input fragments.
    pub accumulated_input: String,
}

/// Watches a normalized event stream and writes an audit record for every
/// completed SQL tool call.
///
/// Only calls to the SQL tool are accumulated. Events are observed, never
/// altered; callers forward them after [`observe`](Self::observe) returns.
pub struct ToolCallCorrelator {
    sink: Arc<dyn AuditSink>,
    correlation_id: String,
    user_prompt: String,
    agent_name: Option<String>,
    sql_tool: String,
    pending: Option<PendingToolCall>,
}

impl ToolCallCorrelator {
    pub fn new(
        sink: Arc<dyn AuditSink>,
        correlation_id: impl Into<String>,
        user_prompt: impl Into<String>,
        agent_name: Option<String>,
    ) -> Self {
        Self {
            sink,
            correlation_id: correlation_id.into(),
            user_prompt: user_prompt.into(),
            agent_name,
            sql_tool: SQL_TOOL_NAME.to_string(),
            pending: None,
        }
    }

    /// Recognize a different tool name as the SQL tool.
    pub fn with_sql_tool(mut self, name: &str) -> Self {
        self.sql_tool = name.to_string();
        self
    }

    /// The call being accumulated, if any.
    pub fn pending(&self) -> Option<&PendingToolCall> {
        self.pending.as_ref()
    }

    /// Update correlation state for one event.
    ///
    /// On completion of a SQL call the audit write happens here, before the
    /// caller re-emits the completion event. Nothing in this method fails.
    pub async fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::ToolCallStart {
                tool_call_id,
                tool_name,
            } => {
                self.pending = (*tool_name == self.sql_tool).then(|| PendingToolCall {
                    tool_call_id: tool_call_id.clone(),
                    name: tool_name.clone(),
                    accumulated_input: String::new(),
                });
            }
            StreamEvent::ToolCallInputDelta {
                tool_call_id,
                input_fragment,
            } => {
                if let Some(pending) = self
                    .pending
                    .as_mut()
                    .filter(|p| p.tool_call_id == *tool_call_id)
                {
                    pending.accumulated_input.push_str(input_fragment);
                }
            }
            StreamEvent::ToolCallComplete { .. } => {
                if let Some(pending) = self.pending.take() {
                    self.complete(pending).await;
                }
            }
            StreamEvent::TextChunk { .. } | StreamEvent::LoopStart => {}
        }
    }

    async fn complete(&self, pending: PendingToolCall) {
        if pending.accumulated_input.is_empty() {
            debug!("Tool call {} finished without input", pending.tool_call_id);
            return;
        }

        let input: Value = match serde_json::from_str(&pending.accumulated_input) {
            Ok(input) => input,
            Err(e) => {
                warn!(
                    "Could not parse tool input for {}: {} ({})",
                    pending.tool_call_id, pending.accumulated_input, e
                );
                return;
            }
        };

        let sql_query = input
            .get("query")
            .and_then(Value::as_str)
            .unwrap_or_default();

        info!(
            tool_use_id = %pending.tool_call_id,
            agent = self.agent_name.as_deref().unwrap_or("agent"),
            "Completed {}: {}",
            pending.name,
            sql_query
        );

        if self.correlation_id.is_empty() || sql_query.is_empty() {
            debug!("Nothing to audit for {}", pending.tool_call_id);
            return;
        }

        let record = AuditRecord::captured(
            &self.correlation_id,
            &self.user_prompt,
            sql_query,
            &pending.tool_call_id,
            self.agent_name.as_deref(),
        );

        match self.sink.put(&record).await {
            Ok(()) => info!("Saved audit record for {}", self.correlation_id),
            Err(e) => error!("Failed to save audit record for {}: {}", self.correlation_id, e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryAuditStore, UnconfiguredAuditSink};

    fn start(id: &str, name: &str) -> StreamEvent {
        StreamEvent::ToolCallStart {
            tool_call_id: id.to_string(),
            tool_name: name.to_string(),
        }
    }

    fn delta(id: &str, fragment: &str) -> StreamEvent {
        StreamEvent::ToolCallInputDelta {
            tool_call_id: id.to_string(),
            input_fragment: fragment.to_string(),
        }
    }

    fn complete(id: &str) -> StreamEvent {
        StreamEvent::ToolCallComplete {
            tool_call_id: id.to_string(),
        }
    }

    fn correlator(store: &Arc<MemoryAuditStore>) -> ToolCallCorrelator {
        ToolCallCorrelator::new(
            store.clone(),
            "req-1",
            "How many sessions?",
            Some("timeseries_agent".to_string()),
        )
    }

    #[tokio::test]
    async fn test_reassembles_fragmented_query() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = correlator(&store);

        correlator.observe(&start("t1", SQL_TOOL_NAME)).await;
        for fragment in ["{\"query\":", "\"SELECT ", "1\"}"] {
            correlator.observe(&delta("t1", fragment)).await;
        }
        assert_eq!(
            correlator.pending().map(|p| p.accumulated_input.as_str()),
            Some("{\"query\":\"SELECT 1\"}")
        );

        correlator.observe(&complete("t1")).await;
        assert!(correlator.pending().is_none());

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sql_query, "SELECT 1");
        assert_eq!(records[0].id, "req-1");
        assert_eq!(records[0].agent_name.as_deref(), Some("timeseries_agent"));
    }

    #[tokio::test]
    async fn test_delta_without_start_is_noop() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = correlator(&store);

        correlator.observe(&delta("t1", "{\"query\":\"SELECT 1\"}")).await;
        assert!(correlator.pending().is_none());

        correlator.observe(&complete("t1")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_delta_for_other_id_is_not_accumulated() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = correlator(&store);

        correlator.observe(&start("t1", SQL_TOOL_NAME)).await;
        correlator.observe(&delta("t2", "garbage")).await;
        assert_eq!(correlator.pending().unwrap().accumulated_input, "");
    }

    #[tokio::test]
    async fn test_malformed_input_writes_nothing() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = correlator(&store);

        correlator.observe(&start("t1", SQL_TOOL_NAME)).await;
        correlator.observe(&delta("t1", "{invalid")).await;
        correlator.observe(&complete("t1")).await;

        assert!(store.is_empty());
        assert!(correlator.pending().is_none());
    }

    #[tokio::test]
    async fn test_other_tools_never_audited() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = correlator(&store);

        correlator.observe(&start("t1", "calculator")).await;
        assert!(correlator.pending().is_none());
        correlator.observe(&delta("t1", "{\"query\":\"SELECT 1\"}")).await;
        correlator.observe(&complete("t1")).await;

        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_missing_or_empty_query_writes_nothing() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = correlator(&store);

        for input in ["{}", "{\"query\":\"\"}", "{\"query\":7}"] {
            correlator.observe(&start("t1", SQL_TOOL_NAME)).await;
            correlator.observe(&delta("t1", input)).await;
            correlator.observe(&complete("t1")).await;
        }
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_empty_correlation_id_writes_nothing() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = ToolCallCorrelator::new(store.clone(), "", "q", None);

        correlator.observe(&start("t1", SQL_TOOL_NAME)).await;
        correlator.observe(&delta("t1", "{\"query\":\"SELECT 1\"}")).await;
        correlator.observe(&complete("t1")).await;
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sink_failure_is_swallowed() {
        let mut correlator =
            ToolCallCorrelator::new(Arc::new(UnconfiguredAuditSink), "req-1", "q", None);

        correlator.observe(&start("t1", SQL_TOOL_NAME)).await;
        correlator.observe(&delta("t1", "{\"query\":\"SELECT 1\"}")).await;
        correlator.observe(&complete("t1")).await;
        assert!(correlator.pending().is_none());
    }

    #[tokio::test]
    async fn test_custom_sql_tool_name() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = correlator(&store).with_sql_tool("execute_sql");

        correlator.observe(&start("t1", "execute_sql")).await;
        correlator.observe(&delta("t1", "{\"query\":\"SELECT 9\"}")).await;
        correlator.observe(&complete("t1")).await;
        assert_eq!(store.records()[0].sql_query, "SELECT 9");
    }
}
