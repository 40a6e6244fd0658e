//! In-memory audit store.
//!
//! Useful for testing and for runs that should not touch disk.

use super::{AuditRecord, AuditSink};
use crate::error::{Result, StreamLensError};
use async_trait::async_trait;
use std::sync::RwLock;

/// In-memory audit store.
#[derive(Debug, Default)]
pub struct MemoryAuditStore {
    records: RwLock<Vec<AuditRecord>>,
}

impl MemoryAuditStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// All records written so far, in write order.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .read()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AuditSink for MemoryAuditStore {
    async fn put(&self, record: &AuditRecord) -> Result<()> {
        let mut records = self
            .records
            .write()
            .map_err(|e| StreamLensError::audit_write(format!("Failed to acquire lock: {}", e)))?;
        records.push(record.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_in_write_order() {
        let store = MemoryAuditStore::new();
        assert!(store.is_empty());

        store
            .put(&AuditRecord::captured("a", "q1", "SELECT 1", "t1", None))
            .await
            .unwrap();
        store
            .put(&AuditRecord::captured("b", "q2", "SELECT 2", "t2", None))
            .await
            .unwrap();

        let records = store.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].sql_query, "SELECT 1");
        assert_eq!(records[1].sql_query, "SELECT 2");
    }
}
