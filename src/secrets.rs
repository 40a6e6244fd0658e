//! Datastore credential resolution.

use crate::error::{Result, StreamLensError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

/// Connection details for the telemetry datastore.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
}

impl DatabaseCredentials {
    /// Environment handed to the tool server process.
    pub fn to_env(&self) -> Vec<(String, String)> {
        vec![
            ("HYDROLIX_HOST".to_string(), self.host.clone()),
            ("HYDROLIX_PORT".to_string(), self.port.clone()),
            ("HYDROLIX_USER".to_string(), self.user.clone()),
            ("HYDROLIX_PASSWORD".to_string(), self.password.clone()),
        ]
    }
}

impl std::fmt::Debug for DatabaseCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseCredentials")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Resolves a secret reference into credentials.
#[async_trait]
pub trait SecretProvider: Send + Sync {
    async fn get_secret(&self, secret_ref: Option<&str>) -> Result<DatabaseCredentials>;
}

#[derive(Debug, Deserialize)]
struct SecretDocument {
    #[serde(rename = "HYDROLIX_HOST")]
    host: Option<String>,
    #[serde(rename = "HYDROLIX_PORT")]
    port: Option<serde_json::Value>,
    #[serde(rename = "HYDROLIX_USER")]
    user: Option<String>,
    #[serde(rename = "HYDROLIX_PASSWORD")]
    password: Option<String>,
}

/// Reads a JSON secret document from an environment variable (`env:NAME`)
/// or from a file path.
#[derive(Debug, Clone)]
pub struct FileSecretProvider {
    default_port: String,
}

impl FileSecretProvider {
    pub fn new(default_port: &str) -> Self {
        Self {
            default_port: default_port.to_string(),
        }
    }

    fn read(&self, secret_ref: &str) -> Result<String> {
        if let Some(name) = secret_ref.strip_prefix("env:") {
            return std::env::var(name).map_err(|_| {
                StreamLensError::config(format!("Secret environment variable {} is not set", name))
            });
        }

        let path = PathBuf::from(shellexpand::tilde(secret_ref).to_string());
        std::fs::read_to_string(&path).map_err(|e| {
            StreamLensError::config(format!("Failed to read secret {:?}: {}", path, e))
        })
    }

    /// Parse a secret document.
    pub fn parse(&self, content: &str) -> Result<DatabaseCredentials> {
        let doc: SecretDocument = serde_json::from_str(content)
            .map_err(|e| StreamLensError::config(format!("Invalid secret document: {}", e)))?;

        let port = match doc.port {
            Some(serde_json::Value::String(s)) if !s.is_empty() => s,
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => self.default_port.clone(),
        };

        Ok(DatabaseCredentials {
            host: doc.host.unwrap_or_default(),
            port,
            user: doc.user.unwrap_or_default(),
            password: doc.password.unwrap_or_default(),
        })
    }
}

impl Default for FileSecretProvider {
    fn default() -> Self {
        Self::new("8088")
    }
}

#[async_trait]
impl SecretProvider for FileSecretProvider {
    async fn get_secret(&self, secret_ref: Option<&str>) -> Result<DatabaseCredentials> {
        let secret_ref = secret_ref.filter(|r| !r.trim().is_empty()).ok_or_else(|| {
            StreamLensError::config(
                "Datastore secret reference not set (datastore.secret_ref or STREAMLENS_SECRET_REF)"
                    .to_string(),
            )
        })?;

        debug!("Resolving datastore secret from {}", secret_ref);
        let content = self.read(secret_ref)?;
        self.parse(&content)
    }
}
