//! Fakes shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use streamlens::agent::{ModelChunk, ModelChunkStream, ModelClient, ModelRequest};
use streamlens::audit::MemoryAuditStore;
use streamlens::config::Prompts;
use streamlens::mcp::{ToolServer, ToolServerLauncher, ToolServerSession};
use streamlens::secrets::{DatabaseCredentials, SecretProvider};
use streamlens::subagent::SubagentServices;
use streamlens::tools::ToolDefinition;
use streamlens::{Result, StreamLensError};

/// Plays back one scripted turn per `stream_turn` call and records requests.
pub struct ScriptedModel {
    turns: Mutex<VecDeque<Vec<ModelChunk>>>,
    requests: Mutex<Vec<ModelRequest>>,
}

impl ScriptedModel {
    pub fn new(turns: Vec<Vec<ModelChunk>>) -> Arc<Self> {
        Arc::new(Self {
            turns: Mutex::new(turns.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn requests(&self) -> Vec<ModelRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelClient for ScriptedModel {
    fn model_id(&self) -> &str {
        "scripted"
    }

    async fn stream_turn(&self, request: ModelRequest) -> Result<ModelChunkStream> {
        self.requests.lock().unwrap().push(request);
        let turn = self
            .turns
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| StreamLensError::model_run("model endpoint unavailable".to_string()))?;
        Ok(futures::stream::iter(turn.into_iter().map(Ok)).boxed())
    }
}

/// A turn that calls `name`, with the arguments split across fragments.
pub fn tool_turn(id: &str, name: &str, fragments: &[&str]) -> Vec<ModelChunk> {
    let mut chunks = vec![ModelChunk::ToolCallDelta {
        index: 0,
        id: Some(id.to_string()),
        name: Some(name.to_string()),
        arguments: None,
    }];
    for fragment in fragments {
        chunks.push(ModelChunk::ToolCallDelta {
            index: 0,
            id: None,
            name: None,
            arguments: Some(fragment.to_string()),
        });
    }
    chunks.push(ModelChunk::Finish("tool_use".to_string()));
    chunks
}

pub fn text_turn(text: &str) -> Vec<ModelChunk> {
    vec![
        ModelChunk::Text(text.to_string()),
        ModelChunk::Finish("end_turn".to_string()),
    ]
}

/// Tool server offering `run_select_query` with a canned result.
#[derive(Default)]
pub struct FakeSqlServer {
    pub queries: Mutex<Vec<Value>>,
    pub closes: AtomicUsize,
}

impl FakeSqlServer {
    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServer for FakeSqlServer {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        Ok(vec![ToolDefinition {
            name: "run_select_query".to_string(),
            description: "Run a SELECT query".to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": { "query": { "type": "string" } },
                "required": ["query"]
            }),
        }])
    }

    async fn call_tool(&self, _name: &str, arguments: Value) -> Result<String> {
        self.queries.lock().unwrap().push(arguments);
        Ok("hits/total\n0.92".to_string())
    }

    async fn close(&self) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Hands out sessions on one shared fake server.
pub struct FakeLauncher {
    pub server: Arc<FakeSqlServer>,
    pub launches: AtomicUsize,
}

impl FakeLauncher {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            server: Arc::new(FakeSqlServer::default()),
            launches: AtomicUsize::new(0),
        })
    }

    pub fn launch_count(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ToolServerLauncher for FakeLauncher {
    async fn launch(&self, _credentials: &DatabaseCredentials) -> Result<ToolServerSession> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        Ok(ToolServerSession::new(self.server.clone()))
    }
}

/// Returns fixed credentials for any reference; an unset reference is a config error.
pub struct StaticSecrets;

#[async_trait]
impl SecretProvider for StaticSecrets {
    async fn get_secret(&self, secret_ref: Option<&str>) -> Result<DatabaseCredentials> {
        match secret_ref {
            Some(_) => Ok(DatabaseCredentials {
                host: "hdx.example.com".to_string(),
                port: "8088".to_string(),
                user: "analyst".to_string(),
                password: "hunter2".to_string(),
            }),
            None => Err(StreamLensError::config(
                "Datastore secret reference is not set".to_string(),
            )),
        }
    }
}

pub fn services(
    model: Arc<ScriptedModel>,
    launcher: Arc<FakeLauncher>,
    audit: Arc<MemoryAuditStore>,
    secret_ref: Option<&str>,
) -> Arc<SubagentServices> {
    Arc::new(SubagentServices {
        model,
        secrets: Arc::new(StaticSecrets),
        launcher,
        audit,
        prompts: Prompts::default(),
        secret_ref: secret_ref.map(str::to_string),
        table: "cdn_logs".to_string(),
        max_iterations: 10,
    })
}
