//! OpenAI-compatible client configuration.

use crate::config::ModelSettings;
use crate::error::{Result, StreamLensError};
use async_openai::{config::OpenAIConfig, Client};
use std::time::Duration;

/// Create a client for the configured endpoint.
///
/// The API key comes from `OPENAI_API_KEY`; `api_base` points the client at
/// any OpenAI-compatible gateway.
pub fn create_client(settings: &ModelSettings) -> Result<Client<OpenAIConfig>> {
    let http_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_secs))
        .build()
        .map_err(|e| StreamLensError::config(format!("Failed to create HTTP client: {}", e)))?;

    let mut config = OpenAIConfig::default();
    if let Some(base) = settings.api_base.as_deref().filter(|b| !b.is_empty()) {
        config = config.with_api_base(base);
    }

    Ok(Client::with_config(config).with_http_client(http_client))
}
