//! Invoke command implementation.

use crate::config::Settings;
use crate::orchestrator::{InvocationRequest, Orchestrator};
use anyhow::Result;
use futures::StreamExt;
use std::io::Write;

/// Run one invocation and write the NDJSON stream to stdout.
pub async fn run_invoke(
    prompt: &str,
    session: Option<String>,
    user: Option<String>,
    timezone: Option<String>,
    last_k: Option<usize>,
    settings: Settings,
) -> Result<()> {
    let orchestrator = Orchestrator::from_settings(&settings)?;

    let request = InvocationRequest {
        prompt: Some(prompt.to_string()),
        session_id: session,
        user_id: user,
        user_timezone: timezone,
        last_k_turns: last_k,
        ..InvocationRequest::default()
    };

    let lines = orchestrator.invoke(request);
    futures::pin_mut!(lines);

    let mut stdout = std::io::stdout();
    while let Some(line) = lines.next().await {
        stdout.write_all(line.as_bytes())?;
        stdout.flush()?;
    }

    Ok(())
}
