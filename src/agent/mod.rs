//! Streaming tool-calling agents.
//!
//! An [`Agent`] pairs a [`ModelClient`] with a system prompt and a
//! [`ToolSet`](crate::tools::ToolSet). Running it yields raw stream records
//! (text deltas, tool-use blocks, loop markers) in the shape the stream
//! normalizer understands, while tools requested by the model are executed
//! between turns.

mod message;
mod model;
mod runner;

pub use message::{ChatMessage, ContentBlock, Role, Transcript, TranscriptObserver};
pub use model::{ModelChunk, ModelChunkStream, ModelClient, ModelRequest, OpenAIModel};
pub use runner::{Agent, AgentRun};
