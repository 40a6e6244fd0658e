//! Top-level request handling for StreamLens.
//!
//! The orchestrator turns one invocation into a stream of NDJSON lines: it
//! builds the request context, loads conversation history, runs a model that
//! can call the domain subagents and the utility tools, and forwards the
//! normalized event stream. Any failure along the way ends the stream with a
//! single readable error chunk.

use crate::agent::{Agent, ChatMessage, ModelClient, OpenAIModel};
use crate::audit::{AuditSink, SqliteAuditStore, UnconfiguredAuditSink};
use crate::config::{Prompts, Settings};
use crate::context::RequestContext;
use crate::error::Result;
use crate::mcp::StdioLauncher;
use crate::memory::{ConversationKey, ConversationMemory, MemoryHook, SqliteMemoryStore};
use crate::secrets::FileSecretProvider;
use crate::stream::{normalize, RawEvent, StreamEvent};
use crate::subagent::{Subagent, SubagentServices};
use crate::tools::ToolSet;
use futures::stream::{self, BoxStream};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Deserializer};
use std::any::Any;
use std::cell::RefCell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Once};
use tracing::{error, info, warn};

/// Prompt used when the payload has none.
pub const MISSING_PROMPT: &str = "No prompt found. Please provide a 'prompt' key in your request.";

/// Inbound invocation payload.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InvocationRequest {
    #[serde(default)]
    pub prompt: Option<String>,
    #[serde(default)]
    pub prompt_uuid: Option<String>,
    #[serde(default)]
    pub user_timezone: Option<String>,
    #[serde(default)]
    pub session_id: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    /// Accepts a number or a numeric string.
    #[serde(default, deserialize_with = "lenient_count")]
    pub last_k_turns: Option<usize>,
}

impl InvocationRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }
}

fn lenient_count<'de, D>(deserializer: D) -> std::result::Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Count {
        Number(u64),
        Text(String),
    }

    match Option::<Count>::deserialize(deserializer)? {
        None => Ok(None),
        Some(Count::Number(n)) => usize::try_from(n).map(Some).map_err(D::Error::custom),
        Some(Count::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("last_k_turns must be a non-negative integer, got {:?}", s))),
    }
}

/// Routes requests to subagents and streams the response.
#[derive(Clone)]
pub struct Orchestrator {
    model: Arc<dyn ModelClient>,
    services: Arc<SubagentServices>,
    memory: Option<Arc<dyn ConversationMemory>>,
    memory_id: String,
    default_last_k_turns: usize,
}

impl Orchestrator {
    pub fn new(model: Arc<dyn ModelClient>, services: Arc<SubagentServices>) -> Self {
        Self {
            model,
            services,
            memory: None,
            memory_id: "default".to_string(),
            default_last_k_turns: 20,
        }
    }

    /// Build the production wiring from settings.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let model: Arc<dyn ModelClient> = Arc::new(OpenAIModel::new(&settings.model)?);

        let audit: Arc<dyn AuditSink> = if settings.audit.enabled {
            Arc::new(SqliteAuditStore::new(&settings.audit_db_path())?)
        } else {
            Arc::new(UnconfiguredAuditSink)
        };

        let services = Arc::new(SubagentServices {
            model: model.clone(),
            secrets: Arc::new(FileSecretProvider::new(&settings.datastore.default_port)),
            launcher: Arc::new(StdioLauncher::new(settings.tool_server.clone())),
            audit,
            prompts: Prompts::load(settings.prompts_dir().as_deref()),
            secret_ref: settings.datastore.secret_ref.clone(),
            table: settings.datastore.table.clone(),
            max_iterations: settings.model.max_iterations,
        });

        let mut orchestrator = Self::new(model, services)
            .with_last_k_turns(settings.memory.last_k_turns);
        if settings.memory.enabled {
            let store = SqliteMemoryStore::new(&settings.memory_db_path())?;
            orchestrator = orchestrator.with_memory(Arc::new(store), &settings.memory.memory_id);
        }
        Ok(orchestrator)
    }

    pub fn with_memory(mut self, memory: Arc<dyn ConversationMemory>, memory_id: &str) -> Self {
        self.memory = Some(memory);
        self.memory_id = memory_id.to_string();
        self
    }

    pub fn with_last_k_turns(mut self, last_k_turns: usize) -> Self {
        self.default_last_k_turns = last_k_turns;
        self
    }

    pub fn model_id(&self) -> &str {
        self.model.model_id()
    }

    /// Handle one invocation.
    ///
    /// Yields newline-terminated JSON records. On failure the last item is a
    /// plain-text error message and the stream ends.
    pub fn invoke(&self, request: InvocationRequest) -> impl Stream<Item = String> + Send + 'static {
        install_panic_hook();
        let this = self.clone();
        let events = stream::once(async move { this.start(request).await }).flat_map(|started| {
            match started {
                Ok(events) => events,
                Err(e) => stream::iter(vec![Err(e)]).boxed(),
            }
        });

        AssertUnwindSafe(events)
            .catch_unwind()
            .scan(false, |failed, item| {
                if *failed {
                    return futures::future::ready(None);
                }
                let line = match item {
                    Ok(Ok(event)) => event.to_ndjson(),
                    Ok(Err(e)) => {
                        *failed = true;
                        let at = e.location();
                        error_chunk(&e, at.file(), at.line())
                    }
                    Err(panic) => {
                        *failed = true;
                        let (file, line) = take_panic_origin()
                            .unwrap_or_else(|| ("<unknown>".to_string(), 0));
                        error_chunk(&panic_message(panic.as_ref()), &file, line)
                    }
                };
                futures::future::ready(Some(line))
            })
    }

    async fn start(&self, request: InvocationRequest) -> Result<BoxStream<'static, Result<StreamEvent>>> {
        let prompt = request
            .prompt
            .clone()
            .unwrap_or_else(|| MISSING_PROMPT.to_string());
        let last_k_turns = request.last_k_turns.unwrap_or(self.default_last_k_turns);
        let ctx = RequestContext::from(request);

        info!(
            correlation_id = %ctx.correlation_id,
            session_id = %ctx.session_id,
            user_id = %ctx.user_id,
            model = %self.model.model_id(),
            "Orchestrator request: {}",
            preview(&prompt, 100)
        );

        let key = ConversationKey::new(&self.memory_id, &ctx.user_id, &ctx.session_id);
        let history = self.load_history(&key, last_k_turns).await;
        info!("Loaded {} context messages", history.len());

        let system_prompt = Prompts::render(
            &self.services.prompts.orchestrator,
            &ctx.timezone,
            &self.services.table,
        );

        let mut tools = ToolSet::new();
        for subagent in Subagent::all(self.services.clone()) {
            tools.push(Arc::new(subagent));
        }
        tools.extend(ToolSet::utilities());

        let mut agent = Agent::new(self.model.clone(), &system_prompt, tools)
            .with_history(history)
            .with_max_iterations(self.services.max_iterations);
        if let Some(memory) = &self.memory {
            agent = agent.with_observer(Arc::new(MemoryHook::new(memory.clone(), key)));
        }

        let raw: BoxStream<'static, Result<RawEvent>> = agent.stream(ctx, &prompt).boxed();
        Ok(normalize(raw).boxed())
    }

    async fn load_history(&self, key: &ConversationKey, last_k_turns: usize) -> Vec<ChatMessage> {
        let Some(memory) = &self.memory else {
            return Vec::new();
        };
        match memory.load(key, last_k_turns).await {
            Ok(history) => history,
            Err(e) => {
                warn!("Failed to load conversation history: {}", e);
                Vec::new()
            }
        }
    }
}

/// Format the terminal error chunk, tagged with the location the failure was raised at.
fn error_chunk(e: &dyn std::fmt::Display, file: &str, line: u32) -> String {
    let message = format!("Error: {} (Line {} in {})", e, line, file);
    error!("Orchestrator error: {}", message);
    format!("I encountered an error processing your request: {}\n", message)
}

thread_local! {
    /// Location of the last panic on this thread.
    static PANIC_ORIGIN: RefCell<Option<(String, u32)>> = const { RefCell::new(None) };
}

/// Chain a hook that remembers where each panic happened. The previous hook still runs.
fn install_panic_hook() {
    static HOOK: Once = Once::new();
    HOOK.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            if let Some(location) = info.location() {
                let origin = (location.file().to_string(), location.line());
                PANIC_ORIGIN.with(|cell| *cell.borrow_mut() = Some(origin));
            }
            previous(info);
        }));
    });
}

/// The panic is caught on the thread that raised it, so the origin is still here.
fn take_panic_origin() -> Option<(String, u32)> {
    PANIC_ORIGIN.with(|cell| cell.borrow_mut().take())
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panic: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panic: {}", s)
    } else {
        "panic in agent run".to_string()
    }
}

fn preview(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        text.to_string()
    } else {
        format!("{}...", text.chars().take(max_chars).collect::<String>())
    }
}

impl From<InvocationRequest> for RequestContext {
    fn from(request: InvocationRequest) -> Self {
        RequestContext::new(
            request.prompt_uuid,
            request.user_timezone,
            request.session_id,
            request.user_id,
        )
    }
}
