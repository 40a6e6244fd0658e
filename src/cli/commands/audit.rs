//! Audit command implementation.

use crate::audit::SqliteAuditStore;
use crate::cli::Output;
use crate::config::Settings;
use anyhow::Result;

/// List captured SQL queries, newest first, or every query for one request.
pub fn run_audit(limit: usize, id: Option<&str>, settings: &Settings) -> Result<()> {
    let path = settings.audit_db_path();
    if !path.exists() {
        Output::warning(&format!("No audit database at {}", path.display()));
        return Ok(());
    }

    let store = SqliteAuditStore::new(&path)?;
    let records = match id {
        Some(id) => store.get_by_id(id)?,
        None => store.list_recent(limit)?,
    };

    if records.is_empty() {
        Output::info("No audit records found.");
        return Ok(());
    }

    Output::header(&format!("Audit records ({})", records.len()));
    if let Some(latest) = store.latest_timestamp()? {
        Output::kv("Latest capture", &latest.to_rfc3339());
    }
    for record in &records {
        Output::audit_record(record);
    }

    Ok(())
}
