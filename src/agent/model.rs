//! Streaming model client abstraction.

use super::message::{ChatMessage, ContentBlock, Role};
use crate::config::ModelSettings;
use crate::error::{Result, StreamLensError};
use crate::openai::create_client;
use crate::tools::ToolDefinition;
use async_openai::types::{
    ChatChoiceStream, ChatCompletionMessageToolCall, ChatCompletionRequestAssistantMessageArgs,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestToolMessageArgs, ChatCompletionRequestUserMessageArgs, ChatCompletionTool,
    ChatCompletionToolType, CreateChatCompletionRequestArgs, FinishReason, FunctionCall,
    FunctionObject,
};
use async_trait::async_trait;
use futures::stream::{self, BoxStream};
use futures::StreamExt;
use tracing::debug;

/// One model turn's input.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDefinition>,
}

/// An increment of a streaming model turn.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelChunk {
    Text(String),
    /// A piece of a tool call. The first piece for an `index` carries the id
    /// and name; later pieces carry argument fragments.
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        arguments: Option<String>,
    },
    /// The turn ended; the value is a stop reason such as `end_turn` or `tool_use`.
    Finish(String),
}

pub type ModelChunkStream = BoxStream<'static, Result<ModelChunk>>;

/// A language model that streams one turn at a time.
#[async_trait]
pub trait ModelClient: Send + Sync {
    fn model_id(&self) -> &str;

    async fn stream_turn(&self, request: ModelRequest) -> Result<ModelChunkStream>;
}

/// Model client for OpenAI-compatible chat completion endpoints.
pub struct OpenAIModel {
    client: async_openai::Client<async_openai::config::OpenAIConfig>,
    model: String,
}

impl OpenAIModel {
    pub fn new(settings: &ModelSettings) -> Result<Self> {
        Ok(Self {
            client: create_client(settings)?,
            model: settings.model.clone(),
        })
    }

    fn build_messages(request: &ModelRequest) -> Result<Vec<ChatCompletionRequestMessage>> {
        let mut messages: Vec<ChatCompletionRequestMessage> = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(request.system.clone())
                .build()
                .map_err(|e| model_error(e))?
                .into(),
        ];

        for message in &request.messages {
            match message.role {
                Role::User => Self::push_user(&mut messages, message)?,
                Role::Assistant => Self::push_assistant(&mut messages, message)?,
            }
        }

        Ok(messages)
    }

    fn push_user(
        messages: &mut Vec<ChatCompletionRequestMessage>,
        message: &ChatMessage,
    ) -> Result<()> {
        for block in &message.content {
            match block {
                ContentBlock::Text { text } => messages.push(
                    ChatCompletionRequestUserMessageArgs::default()
                        .content(text.clone())
                        .build()
                        .map_err(|e| model_error(e))?
                        .into(),
                ),
                ContentBlock::ToolResult {
                    tool_use_id,
                    content,
                    ..
                } => messages.push(
                    ChatCompletionRequestToolMessageArgs::default()
                        .tool_call_id(tool_use_id.clone())
                        .content(content.clone())
                        .build()
                        .map_err(|e| model_error(e))?
                        .into(),
                ),
                ContentBlock::ToolUse { .. } => {}
            }
        }
        Ok(())
    }

    fn push_assistant(
        messages: &mut Vec<ChatCompletionRequestMessage>,
        message: &ChatMessage,
    ) -> Result<()> {
        let text: String = message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();

        let tool_calls: Vec<ChatCompletionMessageToolCall> = message
            .content
            .iter()
            .filter_map(|block| match block {
                ContentBlock::ToolUse { id, name, input } => Some(ChatCompletionMessageToolCall {
                    id: id.clone(),
                    r#type: ChatCompletionToolType::Function,
                    function: FunctionCall {
                        name: name.clone(),
                        arguments: input.to_string(),
                    },
                }),
                _ => None,
            })
            .collect();

        let mut args = ChatCompletionRequestAssistantMessageArgs::default();
        if !text.is_empty() {
            args.content(text);
        }
        if !tool_calls.is_empty() {
            args.tool_calls(tool_calls);
        }
        messages.push(args.build().map_err(|e| model_error(e))?.into());
        Ok(())
    }

    fn build_tools(tools: &[ToolDefinition]) -> Vec<ChatCompletionTool> {
        tools
            .iter()
            .map(|tool| ChatCompletionTool {
                r#type: ChatCompletionToolType::Function,
                function: FunctionObject {
                    name: tool.name.clone(),
                    description: Some(tool.description.clone()),
                    parameters: Some(tool.input_schema.clone()),
                    strict: None,
                },
            })
            .collect()
    }
}

#[async_trait]
impl ModelClient for OpenAIModel {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn stream_turn(&self, request: ModelRequest) -> Result<ModelChunkStream> {
        let messages = Self::build_messages(&request)?;

        let mut args = CreateChatCompletionRequestArgs::default();
        args.model(&self.model).messages(messages);
        if !request.tools.is_empty() {
            args.tools(Self::build_tools(&request.tools));
        }
        let chat_request = args.build().map_err(|e| model_error(e))?;

        debug!(
            "Streaming turn from {} with {} tools",
            self.model,
            request.tools.len()
        );

        let response = self
            .client
            .chat()
            .create_stream(chat_request)
            .await
            .map_err(|e| StreamLensError::model_run(format!("Model API error: {}", e)))?;

        let chunks = response.flat_map(|item| {
            let converted: Vec<Result<ModelChunk>> = match item {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .flat_map(convert_choice)
                    .map(Ok)
                    .collect(),
                Err(e) => vec![Err(StreamLensError::model_run(format!(
                    "Model stream error: {}",
                    e
                )))],
            };
            stream::iter(converted)
        });

        Ok(chunks.boxed())
    }
}

fn convert_choice(choice: ChatChoiceStream) -> Vec<ModelChunk> {
    let mut chunks = Vec::new();

    if let Some(content) = choice.delta.content.filter(|c| !c.is_empty()) {
        chunks.push(ModelChunk::Text(content));
    }

    for call in choice.delta.tool_calls.unwrap_or_default() {
        let (name, arguments) = match call.function {
            Some(function) => (function.name, function.arguments),
            None => (None, None),
        };
        chunks.push(ModelChunk::ToolCallDelta {
            index: call.index,
            id: call.id,
            name,
            arguments,
        });
    }

    if let Some(reason) = choice.finish_reason {
        chunks.push(ModelChunk::Finish(stop_reason(reason).to_string()));
    }

    chunks
}

fn stop_reason(reason: FinishReason) -> &'static str {
    match reason {
        FinishReason::Stop => "end_turn",
        FinishReason::ToolCalls | FinishReason::FunctionCall => "tool_use",
        FinishReason::Length => "max_tokens",
        FinishReason::ContentFilter => "content_filtered",
    }
}

#[track_caller]
fn model_error(e: impl std::fmt::Display) -> StreamLensError {
    StreamLensError::model_run(e.to_string())
}
