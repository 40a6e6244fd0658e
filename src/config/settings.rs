//! Configuration settings for StreamLens.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub general: GeneralSettings,
    pub model: ModelSettings,
    pub memory: MemorySettings,
    pub audit: AuditSettings,
    pub datastore: DatastoreSettings,
    pub tool_server: ToolServerSettings,
    pub prompts: PromptSettings,
    pub server: ServerSettings,
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralSettings {
    /// Directory for storing application data.
    pub data_dir: String,
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for GeneralSettings {
    fn default() -> Self {
        Self {
            data_dir: "~/.streamlens".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// Language model settings shared by the orchestrator and every subagent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub model: String,
    /// OpenAI-compatible endpoint. Unset means the public OpenAI API.
    pub api_base: Option<String>,
    pub timeout_secs: u64,
    /// Maximum model turns in one agent run.
    pub max_iterations: usize,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            model: "gpt-4o".to_string(),
            api_base: None,
            timeout_secs: 300,
            max_iterations: 15,
        }
    }
}

/// Conversation memory settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemorySettings {
    pub enabled: bool,
    /// Namespace for conversation events.
    pub memory_id: String,
    pub sqlite_path: String,
    /// Default number of prior turns loaded per request.
    pub last_k_turns: usize,
}

impl Default for MemorySettings {
    fn default() -> Self {
        Self {
            enabled: true,
            memory_id: "default".to_string(),
            sqlite_path: "~/.streamlens/memory.db".to_string(),
            last_k_turns: 20,
        }
    }
}

/// Query audit settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditSettings {
    pub enabled: bool,
    pub sqlite_path: String,
}

impl Default for AuditSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sqlite_path: "~/.streamlens/audit.db".to_string(),
        }
    }
}

/// Telemetry datastore settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatastoreSettings {
    /// Reference resolved by the secret provider (`env:NAME` or a file path).
    pub secret_ref: Option<String>,
    /// Table name substituted into prompts.
    pub table: String,
    pub default_port: String,
}

impl Default for DatastoreSettings {
    fn default() -> Self {
        Self {
            secret_ref: None,
            table: String::new(),
            default_port: "8088".to_string(),
        }
    }
}

/// How to launch the SQL tool server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolServerSettings {
    pub command: String,
    pub args: Vec<String>,
    /// Extra environment variables for the child process.
    pub env: HashMap<String, String>,
    pub working_dir: Option<String>,
}

impl Default for ToolServerSettings {
    fn default() -> Self {
        Self {
            command: "python".to_string(),
            args: vec!["-m".to_string(), "mcp_hydrolix.main".to_string()],
            env: HashMap::new(),
            working_dir: None,
        }
    }
}

/// Prompt customization settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptSettings {
    /// Directory with `<name>.txt` templates overriding the built-ins.
    pub dir: Option<String>,
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

impl Settings {
    /// Load settings from the default configuration file.
    pub fn load() -> crate::error::Result<Self> {
        Self::load_from(None)
    }

    /// Load settings from a specific path, or default location if None.
    ///
    /// Environment overrides are applied after the file is read.
    pub fn load_from(path: Option<&PathBuf>) -> crate::error::Result<Self> {
        let config_path = match path {
            Some(p) => p.clone(),
            None => Self::default_config_path(),
        };

        let mut settings = if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)?;
            toml::from_str(&content)?
        } else {
            Settings::default()
        };

        settings.apply_env_overrides(|key| std::env::var(key).ok());
        Ok(settings)
    }

    /// Apply `STREAMLENS_*` overrides using `lookup` to read variables.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.is_empty());

        if let Some(v) = get("STREAMLENS_MODEL") {
            self.model.model = v;
        }
        if let Some(v) = get("STREAMLENS_API_BASE") {
            self.model.api_base = Some(v);
        }
        if let Some(v) = get("STREAMLENS_MEMORY_ID") {
            self.memory.memory_id = v;
        }
        if let Some(v) = get("STREAMLENS_SECRET_REF") {
            self.datastore.secret_ref = Some(v);
        }
        if let Some(v) = get("STREAMLENS_TABLE") {
            self.datastore.table = v;
        }
        if let Some(v) = get("STREAMLENS_AUDIT_DB") {
            self.audit.sqlite_path = v;
        }
    }

    /// Save settings to the default configuration file.
    pub fn save(&self) -> crate::error::Result<()> {
        self.save_to(&Self::default_config_path())
    }

    /// Save settings to a specific path.
    pub fn save_to(&self, path: &PathBuf) -> crate::error::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::error::StreamLensError::config(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Get the default configuration file path.
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("streamlens")
            .join("config.toml")
    }

    /// Expand shell variables in paths (e.g., ~).
    pub fn expand_path(path: &str) -> PathBuf {
        PathBuf::from(shellexpand::tilde(path).to_string())
    }

    pub fn data_dir(&self) -> PathBuf {
        Self::expand_path(&self.general.data_dir)
    }

    pub fn memory_db_path(&self) -> PathBuf {
        Self::expand_path(&self.memory.sqlite_path)
    }

    pub fn audit_db_path(&self) -> PathBuf {
        Self::expand_path(&self.audit.sqlite_path)
    }

    pub fn prompts_dir(&self) -> Option<PathBuf> {
        self.prompts.dir.as_deref().map(Self::expand_path)
    }

    /// Set a value by dotted key, e.g. `model.model` or `server.port`.
    pub fn set(&mut self, key: &str, value: &str) -> crate::error::Result<()> {
        use crate::error::StreamLensError;

        let invalid =
            |e: &dyn std::fmt::Display| StreamLensError::config(format!("Invalid value for {}: {}", key, e));
        let optional = |v: &str| {
            if v.is_empty() {
                None
            } else {
                Some(v.to_string())
            }
        };

        match key {
            "general.data_dir" => self.general.data_dir = value.to_string(),
            "general.log_level" => self.general.log_level = value.to_string(),
            "model.model" => self.model.model = value.to_string(),
            "model.api_base" => self.model.api_base = optional(value),
            "model.timeout_secs" => self.model.timeout_secs = value.parse().map_err(|e| invalid(&e))?,
            "model.max_iterations" => {
                self.model.max_iterations = value.parse().map_err(|e| invalid(&e))?
            }
            "memory.enabled" => self.memory.enabled = value.parse().map_err(|e| invalid(&e))?,
            "memory.memory_id" => self.memory.memory_id = value.to_string(),
            "memory.sqlite_path" => self.memory.sqlite_path = value.to_string(),
            "memory.last_k_turns" => {
                self.memory.last_k_turns = value.parse().map_err(|e| invalid(&e))?
            }
            "audit.enabled" => self.audit.enabled = value.parse().map_err(|e| invalid(&e))?,
            "audit.sqlite_path" => self.audit.sqlite_path = value.to_string(),
            "datastore.secret_ref" => self.datastore.secret_ref = optional(value),
            "datastore.table" => self.datastore.table = value.to_string(),
            "datastore.default_port" => self.datastore.default_port = value.to_string(),
            "tool_server.command" => self.tool_server.command = value.to_string(),
            "tool_server.args" => {
                self.tool_server.args = value.split_whitespace().map(String::from).collect()
            }
            "tool_server.working_dir" => self.tool_server.working_dir = optional(value),
            "prompts.dir" => self.prompts.dir = optional(value),
            "server.host" => self.server.host = value.to_string(),
            "server.port" => self.server.port = value.parse().map_err(|e| invalid(&e))?,
            _ => {
                return Err(StreamLensError::config(format!(
                    "Unknown config key: {}",
                    key
                )))
            }
        }
        Ok(())
    }
}
