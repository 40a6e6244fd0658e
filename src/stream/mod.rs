//! Agent-run stream handling.
//!
//! Raw records from a model-driven run are classified by the [`Normalizer`]
//! into [`StreamEvent`]s; subagents additionally pass every event through a
//! [`ToolCallCorrelator`] so completed SQL calls land in the audit trail.

mod correlator;
mod event;
mod normalizer;

pub use correlator::{PendingToolCall, ToolCallCorrelator, SQL_TOOL_NAME};
pub use event::{Classified, IgnoreReason, RawEvent, StreamEvent};
pub use normalizer::Normalizer;

use crate::error::Result;
use futures::{future, Stream, StreamExt};
use tracing::debug;

/// Normalize a raw run stream, dropping records that classify as ignored.
///
/// Order is preserved and nothing is buffered. Errors from the raw stream are
/// passed through.
pub fn normalize<S>(raw: S) -> impl Stream<Item = Result<StreamEvent>>
where
    S: Stream<Item = Result<RawEvent>>,
{
    raw.scan(Normalizer::new(), |normalizer, item| {
        future::ready(Some(item.map(|raw| normalizer.classify(&raw))))
    })
    .filter_map(|item| {
        future::ready(match item {
            Ok(Classified::Event(event)) => Some(Ok(event)),
            Ok(Classified::Ignored(reason)) => {
                debug!("Dropped raw record: {:?}", reason);
                None
            }
            Err(e) => Some(Err(e)),
        })
    })
}

/// Drive a subagent's run to completion and return its narrative text.
///
/// Every normalized event goes through `correlator` before it is considered
/// emitted; the answer is the concatenation of all text chunks in arrival
/// order. The first raw-stream error aborts the run.
pub async fn process_agent_stream<S>(raw: S, correlator: &mut ToolCallCorrelator) -> Result<String>
where
    S: Stream<Item = Result<RawEvent>>,
{
    let events = normalize(raw);
    futures::pin_mut!(events);

    let mut collected = String::new();
    while let Some(event) = events.next().await {
        let event = event?;
        correlator.observe(&event).await;

        match &event {
            StreamEvent::TextChunk { text } => collected.push_str(text),
            other => debug!("{}", other.to_record()),
        }
    }

    Ok(collected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::MemoryAuditStore;
    use crate::error::StreamLensError;
    use futures::stream;
    use std::sync::Arc;

    fn ok(records: Vec<RawEvent>) -> impl Stream<Item = Result<RawEvent>> {
        stream::iter(records.into_iter().map(Ok))
    }

    #[tokio::test]
    async fn test_one_start_and_complete_per_call() {
        let records = vec![
            RawEvent::loop_start(),
            RawEvent::message_start(),
            RawEvent::text("A"),
            RawEvent::content_block_stop(0),
            RawEvent::tool_use_start("t1", "current_time"),
            RawEvent::content_block_stop(1),
            RawEvent::text("B"),
            RawEvent::tool_use_start("t2", SQL_TOOL_NAME),
            RawEvent::tool_use_input("t2", SQL_TOOL_NAME, "{\"query\":\"SELECT 1\"}"),
            RawEvent::content_block_stop(2),
            RawEvent::text("C"),
            RawEvent::message_stop("end_turn"),
        ];

        let events: Vec<StreamEvent> = normalize(ok(records))
            .map(|e| e.unwrap())
            .collect()
            .await;

        let starts = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ToolCallStart { .. }))
            .count();
        let completes: Vec<&StreamEvent> = events
            .iter()
            .filter(|e| matches!(e, StreamEvent::ToolCallComplete { .. }))
            .collect();
        assert_eq!(starts, 2);
        assert_eq!(
            completes,
            vec![
                &StreamEvent::ToolCallComplete { tool_call_id: "t1".to_string() },
                &StreamEvent::ToolCallComplete { tool_call_id: "t2".to_string() },
            ]
        );
        assert_eq!(events.first(), Some(&StreamEvent::LoopStart));
    }

    #[tokio::test]
    async fn test_process_collects_text_and_audits() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = ToolCallCorrelator::new(
            store.clone(),
            "req-1",
            "What is the cache hit rate?",
            Some("cache_origin_agent".to_string()),
        );

        let records = vec![
            RawEvent::loop_start(),
            RawEvent::tool_use_start("t1", SQL_TOOL_NAME),
            RawEvent::tool_use_input("t1", SQL_TOOL_NAME, "{\"query\":"),
            RawEvent::tool_use_input("t1", SQL_TOOL_NAME, "\"SELECT hits/total FROM cdn_logs\"}"),
            RawEvent::content_block_stop(0),
            RawEvent::text("Your cache hit rate "),
            RawEvent::text("is 92%."),
        ];

        let answer = process_agent_stream(ok(records), &mut correlator).await.unwrap();
        assert_eq!(answer, "Your cache hit rate is 92%.");

        let records = store.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].sql_query, "SELECT hits/total FROM cdn_logs");
    }

    #[tokio::test]
    async fn test_malformed_input_keeps_streaming() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = ToolCallCorrelator::new(store.clone(), "req-1", "q", None);

        let records = vec![
            RawEvent::tool_use_start("t1", SQL_TOOL_NAME),
            RawEvent::tool_use_input("t1", SQL_TOOL_NAME, "{invalid"),
            RawEvent::content_block_stop(0),
            RawEvent::text("still here"),
        ];

        let answer = process_agent_stream(ok(records), &mut correlator).await.unwrap();
        assert_eq!(answer, "still here");
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_raw_error_aborts() {
        let store = Arc::new(MemoryAuditStore::new());
        let mut correlator = ToolCallCorrelator::new(store, "req-1", "q", None);

        let raw = stream::iter(vec![
            Ok(RawEvent::text("partial")),
            Err(StreamLensError::model_run("connection reset".to_string())),
        ]);

        let err = process_agent_stream(raw, &mut correlator).await.unwrap_err();
        assert!(matches!(err, StreamLensError::ModelRun(..)));
    }
}
