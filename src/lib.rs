//! StreamLens - streaming-video telemetry analytics assistant
//!
//! Routes natural-language questions about CDN and player telemetry to
//! SQL-backed analytics subagents and streams the answer back as
//! newline-delimited JSON.
//!
//! # Overview
//!
//! StreamLens:
//! - Normalizes a model's raw streaming events into a closed event set
//! - Captures every SQL query a subagent runs into an audit trail
//! - Keeps per-session conversation history
//! - Carries each request's identity and timezone explicitly through the call chain
//!
//! # Architecture
//!
//! - `context` - Per-request context
//! - `stream` - Event normalization, tool-call correlation, aggregation
//! - `audit` - Audit records and stores
//! - `agent` - Model client and the tool-calling agent loop
//! - `mcp` - Tool-server client (JSON-RPC over stdio)
//! - `tools` - Tool trait and local utility tools
//! - `subagent` - Domain subagents exposed as tools
//! - `memory` - Conversation memory
//! - `secrets` - Datastore credential lookup
//! - `orchestrator` - Top-level request handling
//! - `config` - Settings and prompt templates
//!
//! # Example
//!
//! ```rust,no_run
//! use futures::StreamExt;
//! use streamlens::config::Settings;
//! use streamlens::orchestrator::{InvocationRequest, Orchestrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     let orchestrator = Orchestrator::from_settings(&settings)?;
//!
//!     let lines = orchestrator.invoke(InvocationRequest::new("What is the cache hit rate?"));
//!     futures::pin_mut!(lines);
//!     while let Some(line) = lines.next().await {
//!         print!("{}", line);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod agent;
pub mod audit;
pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod mcp;
pub mod memory;
pub mod openai;
pub mod orchestrator;
pub mod secrets;
pub mod stream;
pub mod subagent;
pub mod tools;

pub use error::{Result, StreamLensError};
