//! Query audit trail.
//!
//! Every completed SQL-execution tool call is recorded with the question that
//! caused it and the subagent that ran it. Writers treat failures as
//! non-fatal: the correlator logs them and keeps streaming.

mod memory;
mod sqlite;

pub use memory::MemoryAuditStore;
pub use sqlite::SqliteAuditStore;

use crate::error::{Result, StreamLensError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Message stored with every record captured from a model stream.
pub const CAPTURED_MESSAGE: &str = "Query captured from stream";

/// One persisted audit entry. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// The request correlation id.
    pub id: String,
    pub timestamp: DateTime<Utc>,
    /// The question handed to the subagent.
    pub user_prompt: String,
    pub sql_query: String,
    pub description: String,
    /// Only the tool call id; query results are not captured here.
    pub result_stub: Value,
    pub message: String,
    pub agent_name: Option<String>,
}

impl AuditRecord {
    /// Build the record for a SQL call observed in an agent stream.
    pub fn captured(
        correlation_id: &str,
        user_prompt: &str,
        sql_query: &str,
        tool_call_id: &str,
        agent_name: Option<&str>,
    ) -> Self {
        Self {
            id: correlation_id.to_string(),
            timestamp: Utc::now(),
            user_prompt: user_prompt.to_string(),
            sql_query: sql_query.to_string(),
            description: format!("Query executed by {}", agent_name.unwrap_or("agent")),
            result_stub: serde_json::json!({ "toolUseId": tool_call_id }),
            message: CAPTURED_MESSAGE.to_string(),
            agent_name: agent_name.map(str::to_string),
        }
    }
}

/// Destination for audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Persist one record.
    async fn put(&self, record: &AuditRecord) -> Result<()>;
}

/// Sink used when no audit store is configured; every write fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredAuditSink;

#[async_trait]
impl AuditSink for UnconfiguredAuditSink {
    async fn put(&self, _record: &AuditRecord) -> Result<()> {
        Err(StreamLensError::audit_write(
            "audit store is not configured".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_captured_record_fields() {
        let record = AuditRecord::captured(
            "req-1",
            "What is the cache hit rate?",
            "SELECT 1",
            "tool-7",
            Some("cache_origin_agent"),
        );
        assert_eq!(record.id, "req-1");
        assert_eq!(record.description, "Query executed by cache_origin_agent");
        assert_eq!(record.result_stub, serde_json::json!({ "toolUseId": "tool-7" }));
        assert_eq!(record.message, CAPTURED_MESSAGE);
    }

    #[test]
    fn test_captured_record_without_agent() {
        let record = AuditRecord::captured("req-1", "q", "SELECT 1", "t", None);
        assert_eq!(record.description, "Query executed by agent");
        assert!(record.agent_name.is_none());
    }

    #[tokio::test]
    async fn test_unconfigured_sink_fails() {
        let record = AuditRecord::captured("req-1", "q", "SELECT 1", "t", None);
        let err = UnconfiguredAuditSink.put(&record).await.unwrap_err();
        assert!(matches!(err, StreamLensError::AuditWrite(..)));
    }
}
