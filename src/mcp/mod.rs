//! MCP (Model Context Protocol) client for the SQL tool server.
//!
//! Each subagent invocation launches its own tool server process, speaks
//! JSON-RPC 2.0 to it over stdio, and shuts it down when the invocation ends.

mod client;
mod protocol;

pub use client::McpClient;

use crate::config::ToolServerSettings;
use crate::context::RequestContext;
use crate::error::{Result, StreamLensError};
use crate::secrets::DatabaseCredentials;
use crate::tools::{Tool, ToolDefinition, ToolSet};
use async_trait::async_trait;
use serde_json::Value;
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// A connected tool server.
#[async_trait]
pub trait ToolServer: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>>;

    /// Call a tool and return its text output.
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String>;

    /// Stop the server. Calling it twice is harmless.
    async fn close(&self) -> Result<()>;
}

/// Starts a tool server for one subagent invocation.
#[async_trait]
pub trait ToolServerLauncher: Send + Sync {
    async fn launch(&self, credentials: &DatabaseCredentials) -> Result<ToolServerSession>;
}

/// Scoped handle on a running tool server.
///
/// Call [`close`](Self::close) when done. A session dropped without closing
/// (a cancelled request) releases the server when the last tool referencing it
/// goes away.
pub struct ToolServerSession {
    server: Arc<dyn ToolServer>,
    closed: bool,
}

impl ToolServerSession {
    pub fn new(server: Arc<dyn ToolServer>) -> Self {
        Self {
            server,
            closed: false,
        }
    }

    /// The server's tools, wrapped so an agent can call them.
    pub async fn tools(&self) -> Result<ToolSet> {
        let mut set = ToolSet::new();
        for definition in self.server.list_tools().await? {
            set.push(Arc::new(RemoteTool {
                definition,
                server: self.server.clone(),
            }));
        }
        Ok(set)
    }

    pub async fn close(mut self) -> Result<()> {
        self.closed = true;
        self.server.close().await
    }
}

impl Drop for ToolServerSession {
    fn drop(&mut self) {
        if !self.closed {
            debug!("Tool server session dropped without close");
        }
    }
}

/// A tool that lives on a tool server.
pub struct RemoteTool {
    definition: ToolDefinition,
    server: Arc<dyn ToolServer>,
}

#[async_trait]
impl Tool for RemoteTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn call(&self, _ctx: &RequestContext, input: Value) -> Result<String> {
        let input = if input.is_null() {
            serde_json::json!({})
        } else {
            input
        };
        self.server.call_tool(&self.definition.name, input).await
    }
}

/// Launches the configured command as a child process.
#[derive(Debug, Clone)]
pub struct StdioLauncher {
    settings: ToolServerSettings,
}

impl StdioLauncher {
    pub fn new(settings: ToolServerSettings) -> Self {
        Self { settings }
    }

    fn command(&self, credentials: &DatabaseCredentials) -> Command {
        let mut cmd = Command::new(&self.settings.command);
        cmd.args(&self.settings.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        for (key, value) in &self.settings.env {
            cmd.env(key, value);
        }
        for (key, value) in credentials.to_env() {
            cmd.env(key, value);
        }
        if let Some(dir) = &self.settings.working_dir {
            cmd.current_dir(shellexpand::tilde(dir).to_string());
        }
        cmd
    }
}

#[async_trait]
impl ToolServerLauncher for StdioLauncher {
    async fn launch(&self, credentials: &DatabaseCredentials) -> Result<ToolServerSession> {
        info!(
            "Starting tool server: {} {}",
            self.settings.command,
            self.settings.args.join(" ")
        );

        let mut child = self.command(credentials).spawn().map_err(|e| {
            StreamLensError::tool_protocol(format!(
                "Failed to spawn tool server '{}': {}",
                self.settings.command, e
            ))
        })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            StreamLensError::tool_protocol("Failed to capture tool server stdin".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            StreamLensError::tool_protocol("Failed to capture tool server stdout".to_string())
        })?;

        match McpClient::connect(stdout, stdin, Some(child)).await {
            Ok(client) => Ok(ToolServerSession::new(Arc::new(client))),
            Err(e) => {
                warn!("Tool server handshake failed: {}", e);
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingServer {
        calls: AtomicUsize,
        closes: AtomicUsize,
    }

    #[async_trait]
    impl ToolServer for CountingServer {
        async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
            Ok(vec![ToolDefinition {
                name: "run_select_query".to_string(),
                description: "Run a SELECT query".to_string(),
                input_schema: serde_json::json!({ "type": "object" }),
            }])
        }

        async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} {}", name, arguments))
        }

        async fn close(&self) -> Result<()> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_session_wraps_remote_tools() {
        let server = Arc::new(CountingServer::default());
        let session = ToolServerSession::new(server.clone());

        let tools = session.tools().await.unwrap();
        assert_eq!(tools.names(), vec!["run_select_query"]);

        let out = tools
            .call(&RequestContext::default(), "run_select_query", Value::Null)
            .await
            .unwrap();
        assert_eq!(out, "run_select_query {}");

        session.close().await.unwrap();
        assert_eq!(server.calls.load(Ordering::SeqCst), 1);
        assert_eq!(server.closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_command_env() {
        let mut settings = ToolServerSettings::default();
        settings.env.insert("PYTHONPATH".to_string(), "src/mcp".to_string());
        let launcher = StdioLauncher::new(settings);
        let creds = DatabaseCredentials {
            host: "hdx.example.com".to_string(),
            port: "8088".to_string(),
            user: "u".to_string(),
            password: "p".to_string(),
        };

        let cmd = launcher.command(&creds);
        let envs: Vec<(String, String)> = cmd
            .as_std()
            .get_envs()
            .filter_map(|(k, v)| Some((k.to_str()?.to_string(), v?.to_str()?.to_string())))
            .collect();
        assert!(envs.contains(&("HYDROLIX_HOST".to_string(), "hdx.example.com".to_string())));
        assert!(envs.contains(&("PYTHONPATH".to_string(), "src/mcp".to_string())));
        assert_eq!(cmd.as_std().get_program(), "python");
    }

    #[tokio::test]
    async fn test_spawn_failure_is_protocol_error() {
        let launcher = StdioLauncher::new(ToolServerSettings {
            command: "/nonexistent/streamlens-tool-server".to_string(),
            ..ToolServerSettings::default()
        });
        let creds = DatabaseCredentials {
            host: String::new(),
            port: "8088".to_string(),
            user: String::new(),
            password: String::new(),
        };
        let err = launcher.launch(&creds).await.err().unwrap();
        assert!(matches!(err, StreamLensError::ToolProtocol(..)));
    }
}
