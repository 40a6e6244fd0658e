//! SQLite-backed audit store.

use super::{AuditRecord, AuditSink};
use crate::error::{Result, StreamLensError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, info, instrument};

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS query_audit (
        row_id INTEGER PRIMARY KEY AUTOINCREMENT,
        id TEXT NOT NULL,
        timestamp INTEGER NOT NULL,
        datetime TEXT NOT NULL,
        user_prompt TEXT NOT NULL,
        sql_query TEXT NOT NULL,
        description TEXT NOT NULL,
        data TEXT NOT NULL,
        message TEXT NOT NULL,
        agent_name TEXT
    );

    CREATE INDEX IF NOT EXISTS idx_query_audit_id ON query_audit(id);
    CREATE INDEX IF NOT EXISTS idx_query_audit_timestamp ON query_audit(timestamp);
"#;

const SELECT_COLUMNS: &str =
    "id, datetime, user_prompt, sql_query, description, data, message, agent_name";

/// Row as stored, before timestamp and JSON decoding.
type RawRow = (String, String, String, String, String, String, String, Option<String>);

/// SQLite audit store.
pub struct SqliteAuditStore {
    conn: Mutex<Connection>,
}

impl SqliteAuditStore {
    /// Open (or create) the audit database at `path`.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized SQLite audit store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory audit store (useful for testing).
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
            .map_err(|e| StreamLensError::audit_write(format!("Failed to acquire lock: {}", e)))
    }

    /// Most recent records first.
    pub fn list_recent(&self, limit: usize) -> Result<Vec<AuditRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM query_audit ORDER BY row_id DESC LIMIT ?1",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![limit as i64], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode_row).collect()
    }

    /// All records for one correlation id, oldest first.
    pub fn get_by_id(&self, id: &str) -> Result<Vec<AuditRecord>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM query_audit WHERE id = ?1 ORDER BY row_id ASC",
            SELECT_COLUMNS
        ))?;
        let rows = stmt
            .query_map(params![id], read_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        rows.into_iter().map(decode_row).collect()
    }

    /// Timestamp of the newest record, if any.
    pub fn latest_timestamp(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let latest: Option<String> = conn
            .query_row(
                "SELECT datetime FROM query_audit ORDER BY row_id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;

        latest.map(|s| parse_datetime(&s)).transpose()
    }
}

#[async_trait]
impl AuditSink for SqliteAuditStore {
    #[instrument(skip(self, record), fields(id = %record.id))]
    async fn put(&self, record: &AuditRecord) -> Result<()> {
        let conn = self.lock()?;

        conn.execute(
            r#"
            INSERT INTO query_audit
            (id, timestamp, datetime, user_prompt, sql_query, description, data, message, agent_name)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                record.id,
                record.timestamp.timestamp(),
                record.timestamp.to_rfc3339(),
                record.user_prompt,
                record.sql_query,
                record.description,
                record.result_stub.to_string(),
                record.message,
                record.agent_name,
            ],
        )
        .map_err(|e| StreamLensError::audit_write(e.to_string()))?;

        debug!("Stored audit record for {}", record.id);
        Ok(())
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn decode_row(row: RawRow) -> Result<AuditRecord> {
    let (id, datetime, user_prompt, sql_query, description, data, message, agent_name) = row;
    Ok(AuditRecord {
        id,
        timestamp: parse_datetime(&datetime)?,
        user_prompt,
        sql_query,
        description,
        result_stub: serde_json::from_str(&data)?,
        message,
        agent_name,
    })
}

fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StreamLensError::parse(format!("invalid audit timestamp {:?}: {}", s, e)))
}
