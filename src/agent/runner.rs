//! Agent runner: a streaming tool-calling loop.

use super::message::{ChatMessage, ContentBlock, Role, Transcript, TranscriptObserver};
use super::model::{ModelChunk, ModelChunkStream, ModelClient, ModelRequest};
use crate::context::RequestContext;
use crate::error::{Result, StreamLensError};
use crate::stream::RawEvent;
use crate::tools::ToolSet;
use futures::{Stream, StreamExt};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::{debug, info};

/// Default cap on model turns per run.
const DEFAULT_MAX_ITERATIONS: usize = 15;

/// A model wired to a system prompt and a tool set.
pub struct Agent {
    model: Arc<dyn ModelClient>,
    system_prompt: String,
    tools: ToolSet,
    history: Vec<ChatMessage>,
    observers: Vec<Arc<dyn TranscriptObserver>>,
    max_iterations: usize,
}

impl Agent {
    pub fn new(model: Arc<dyn ModelClient>, system_prompt: &str, tools: ToolSet) -> Self {
        Self {
            model,
            system_prompt: system_prompt.to_string(),
            tools,
            history: Vec::new(),
            observers: Vec::new(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
        }
    }

    /// Seed the conversation with prior messages.
    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    /// Register an observer for every message appended during the run.
    pub fn with_observer(mut self, observer: Arc<dyn TranscriptObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn with_max_iterations(mut self, max: usize) -> Self {
        self.max_iterations = max;
        self
    }

    /// Start a run for `prompt`. Nothing happens until the stream is polled.
    pub fn run(self, ctx: RequestContext, prompt: &str) -> AgentRun {
        let transcript = Transcript::new(self.history.clone(), self.observers.clone());
        AgentRun {
            agent: self,
            ctx,
            transcript,
            prompt: Some(prompt.to_string()),
            queue: VecDeque::new(),
            phase: Phase::Start,
            iterations: 0,
        }
    }

    /// Convenience for `run(..).into_stream()`.
    pub fn stream(self, ctx: RequestContext, prompt: &str) -> impl Stream<Item = Result<RawEvent>> + Send {
        self.run(ctx, prompt).into_stream()
    }
}

enum Phase {
    Start,
    Request,
    Streaming(ModelChunkStream, TurnState),
    Executing(Vec<StreamedToolCall>),
    Done,
}

/// A tool call assembled from a model turn.
#[derive(Debug, Clone)]
struct StreamedToolCall {
    index: u32,
    id: String,
    name: String,
    arguments: String,
}

/// Bookkeeping for one model turn.
#[derive(Default)]
struct TurnState {
    text: String,
    tool_calls: Vec<StreamedToolCall>,
    /// Content block currently open: (block index, is tool call).
    open_block: Option<(u32, bool)>,
    next_block: u32,
    stop_reason: Option<String>,
}

impl TurnState {
    fn apply(&mut self, chunk: ModelChunk, out: &mut VecDeque<RawEvent>) {
        match chunk {
            ModelChunk::Text(text) => {
                if matches!(self.open_block, Some((_, true))) {
                    self.close_block(out);
                }
                if self.open_block.is_none() {
                    self.open_block = Some((self.next_block, false));
                    self.next_block += 1;
                }
                out.push_back(RawEvent::text(&text));
                self.text.push_str(&text);
            }
            ModelChunk::ToolCallDelta {
                index,
                id,
                name,
                arguments,
            } => {
                let is_new = self.tool_calls.last().map_or(true, |call| call.index != index);
                if is_new {
                    self.close_block(out);
                    let call = StreamedToolCall {
                        index,
                        id: id.unwrap_or_else(|| format!("tooluse_{}", uuid::Uuid::new_v4().simple())),
                        name: name.unwrap_or_default(),
                        arguments: String::new(),
                    };
                    out.push_back(RawEvent::tool_use_start(&call.id, &call.name));
                    self.open_block = Some((self.next_block, true));
                    self.next_block += 1;
                    self.tool_calls.push(call);
                }

                if let (Some(fragment), Some(call)) = (
                    arguments.filter(|a| !a.is_empty()),
                    self.tool_calls.last_mut(),
                ) {
                    call.arguments.push_str(&fragment);
                    out.push_back(RawEvent::tool_use_input(&call.id, &call.name, &fragment));
                }
            }
            ModelChunk::Finish(reason) => self.stop_reason = Some(reason),
        }
    }

    fn close_block(&mut self, out: &mut VecDeque<RawEvent>) {
        if let Some((index, _)) = self.open_block.take() {
            out.push_back(RawEvent::content_block_stop(index));
        }
    }

    fn finish(&mut self, out: &mut VecDeque<RawEvent>) {
        self.close_block(out);
        let reason = self.stop_reason.clone().unwrap_or_else(|| {
            if self.tool_calls.is_empty() {
                "end_turn".to_string()
            } else {
                "tool_use".to_string()
            }
        });
        out.push_back(RawEvent::message_stop(&reason));
    }

    fn assistant_message(&self) -> ChatMessage {
        let mut content = Vec::new();
        if !self.text.is_empty() {
            content.push(ContentBlock::Text {
                text: self.text.clone(),
            });
        }
        for call in &self.tool_calls {
            content.push(ContentBlock::ToolUse {
                id: call.id.clone(),
                name: call.name.clone(),
                input: parse_arguments(&call.arguments),
            });
        }
        ChatMessage {
            role: Role::Assistant,
            content,
        }
    }
}

fn parse_arguments(arguments: &str) -> Value {
    if arguments.trim().is_empty() {
        return serde_json::json!({});
    }
    serde_json::from_str(arguments).unwrap_or_else(|_| Value::String(arguments.to_string()))
}

/// One in-flight agent run, pulled one raw record at a time.
///
/// Each model turn is streamed out as raw records; requested tools are then
/// executed and the next turn starts, until a turn asks for no tools.
pub struct AgentRun {
    agent: Agent,
    ctx: RequestContext,
    transcript: Transcript,
    prompt: Option<String>,
    queue: VecDeque<RawEvent>,
    phase: Phase,
    iterations: usize,
}

impl AgentRun {
    /// The next raw record, or `None` once the run has finished.
    ///
    /// After an error is returned the run is over.
    pub async fn next_event(&mut self) -> Option<Result<RawEvent>> {
        loop {
            if let Some(event) = self.queue.pop_front() {
                return Some(Ok(event));
            }

            match std::mem::replace(&mut self.phase, Phase::Done) {
                Phase::Start => {
                    if let Some(prompt) = self.prompt.take() {
                        self.transcript.append(ChatMessage::user(prompt)).await;
                    }
                    self.queue.push_back(RawEvent::loop_start());
                    self.phase = Phase::Request;
                }
                Phase::Request => {
                    self.iterations += 1;
                    if self.iterations > self.agent.max_iterations {
                        return Some(Err(StreamLensError::model_run(format!(
                            "Agent exceeded maximum iterations ({})",
                            self.agent.max_iterations
                        ))));
                    }
                    debug!("Agent iteration {}", self.iterations);

                    let request = ModelRequest {
                        system: self.agent.system_prompt.clone(),
                        messages: self.transcript.messages().to_vec(),
                        tools: self.agent.tools.definitions(),
                    };
                    match self.agent.model.stream_turn(request).await {
                        Ok(chunks) => {
                            self.queue.push_back(RawEvent::message_start());
                            self.phase = Phase::Streaming(chunks, TurnState::default());
                        }
                        Err(e) => return Some(Err(e)),
                    }
                }
                Phase::Streaming(mut chunks, mut turn) => match chunks.next().await {
                    Some(Ok(chunk)) => {
                        turn.apply(chunk, &mut self.queue);
                        self.phase = Phase::Streaming(chunks, turn);
                    }
                    Some(Err(e)) => return Some(Err(e)),
                    None => {
                        turn.finish(&mut self.queue);
                        self.transcript.append(turn.assistant_message()).await;
                        if !turn.tool_calls.is_empty() {
                            self.phase = Phase::Executing(turn.tool_calls);
                        }
                    }
                },
                Phase::Executing(calls) => {
                    let mut results = Vec::with_capacity(calls.len());
                    for call in calls {
                        results.push(execute_tool_call(&self.agent.tools, &self.ctx, call).await);
                    }
                    self.transcript
                        .append(ChatMessage {
                            role: Role::User,
                            content: results,
                        })
                        .await;
                    self.phase = Phase::Request;
                }
                Phase::Done => return None,
            }
        }
    }

    /// Messages accumulated so far, including history.
    pub fn messages(&self) -> &[ChatMessage] {
        self.transcript.messages()
    }

    /// Turn the run into a stream of raw records.
    pub fn into_stream(self) -> impl Stream<Item = Result<RawEvent>> + Send {
        futures::stream::unfold(self, |mut run| async move {
            run.next_event().await.map(|item| (item, run))
        })
    }
}

/// Run one requested tool. Failures become an error result for the model.
async fn execute_tool_call(
    tools: &ToolSet,
    ctx: &RequestContext,
    call: StreamedToolCall,
) -> ContentBlock {
    info!("Agent calling tool: {} with args: {}", call.name, call.arguments);

    let input = parse_arguments(&call.arguments);
    let (content, is_error) = match tools.call(ctx, &call.name, input).await {
        Ok(output) => (output, false),
        Err(e) => (format!("Tool error: {}", e), true),
    };

    ContentBlock::ToolResult {
        tool_use_id: call.id,
        content,
        is_error,
    }
}
