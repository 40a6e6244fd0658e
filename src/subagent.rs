//! Domain subagents.
//!
//! A subagent is exposed to the orchestrator as an ordinary tool taking a
//! `query`. Each call resolves datastore credentials, launches a tool server,
//! runs a domain-prompted agent over the server's SQL tools plus the local
//! utilities, and returns the aggregated answer. Every failure is turned into
//! text here so the orchestrator's model always gets a tool result.

use crate::agent::{Agent, ModelClient};
use crate::audit::AuditSink;
use crate::config::Prompts;
use crate::context::RequestContext;
use crate::error::Result;
use crate::mcp::{ToolServerLauncher, ToolServerSession};
use crate::secrets::SecretProvider;
use crate::stream::{process_agent_stream, ToolCallCorrelator};
use crate::tools::{parse_args, Tool, ToolDefinition, ToolSet};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{error, info, warn};

/// The analytics domains a question can be routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyticsDomain {
    /// General time-series and CMCD queries.
    TimeSeries,
    /// Quality of Experience: buffering, bitrate, session quality.
    QoeAnalysis,
    /// CDN cache efficiency and origin performance.
    CacheOrigin,
}

impl AnalyticsDomain {
    pub const ALL: [AnalyticsDomain; 3] = [
        AnalyticsDomain::TimeSeries,
        AnalyticsDomain::QoeAnalysis,
        AnalyticsDomain::CacheOrigin,
    ];

    /// Tool name the orchestrator sees; also recorded as the audit agent name.
    pub fn tool_name(&self) -> &'static str {
        match self {
            AnalyticsDomain::TimeSeries => "timeseries_agent",
            AnalyticsDomain::QoeAnalysis => "qoe_analysis_agent",
            AnalyticsDomain::CacheOrigin => "cache_origin_agent",
        }
    }

    fn label(&self) -> &'static str {
        match self {
            AnalyticsDomain::TimeSeries => "time-series",
            AnalyticsDomain::QoeAnalysis => "QoE",
            AnalyticsDomain::CacheOrigin => "cache/origin",
        }
    }

    fn description(&self) -> &'static str {
        match self {
            AnalyticsDomain::TimeSeries => {
                "Analyze streaming video time-series data: CDN performance, CMCD metrics, \
                 buffer starvation and playback diagnostics, regional and edge comparisons."
            }
            AnalyticsDomain::QoeAnalysis => {
                "Analyze viewer Quality of Experience: buffer health and rebuffering, bitrate \
                 adaptation and throughput, session quality, geographic QoE breakdowns."
            }
            AnalyticsDomain::CacheOrigin => {
                "Analyze CDN cache efficiency and origin performance: hit/miss rates, origin vs \
                 edge timing, HTTP error rates, bandwidth, edge location breakdowns."
            }
        }
    }

    /// The question as handed to the domain agent.
    pub fn format_query(&self, query: &str) -> String {
        match self {
            AnalyticsDomain::TimeSeries => {
                format!("Analyze time-series data for this user question: {}", query)
            }
            AnalyticsDomain::QoeAnalysis => format!("Analyze Quality of Experience for: {}", query),
            AnalyticsDomain::CacheOrigin => {
                format!("Analyze cache and origin performance for: {}", query)
            }
        }
    }

    /// Answer returned when the run produced no text.
    pub fn apology(&self) -> String {
        format!(
            "I apologize, but I couldn't process your {} analysis request.",
            self.label()
        )
    }

    fn prompt<'a>(&self, prompts: &'a Prompts) -> &'a str {
        match self {
            AnalyticsDomain::TimeSeries => &prompts.timeseries,
            AnalyticsDomain::QoeAnalysis => &prompts.qoe_analysis,
            AnalyticsDomain::CacheOrigin => &prompts.cache_origin,
        }
    }
}

impl std::fmt::Display for AnalyticsDomain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tool_name())
    }
}

/// Collaborators shared by every subagent.
pub struct SubagentServices {
    pub model: Arc<dyn ModelClient>,
    pub secrets: Arc<dyn SecretProvider>,
    pub launcher: Arc<dyn ToolServerLauncher>,
    pub audit: Arc<dyn AuditSink>,
    pub prompts: Prompts,
    pub secret_ref: Option<String>,
    /// Substituted for `{table}` in domain prompts.
    pub table: String,
    pub max_iterations: usize,
}

/// One domain subagent.
#[derive(Clone)]
pub struct Subagent {
    domain: AnalyticsDomain,
    services: Arc<SubagentServices>,
}

#[derive(Debug, Deserialize)]
struct SubagentArgs {
    query: String,
}

impl Subagent {
    pub fn new(domain: AnalyticsDomain, services: Arc<SubagentServices>) -> Self {
        Self { domain, services }
    }

    /// All three domain subagents over the same services.
    pub fn all(services: Arc<SubagentServices>) -> Vec<Subagent> {
        AnalyticsDomain::ALL
            .iter()
            .map(|domain| Subagent::new(*domain, services.clone()))
            .collect()
    }

    /// Answer `query`. Never fails: errors come back as text.
    pub async fn answer(&self, ctx: &RequestContext, query: &str) -> String {
        let correlation_id = ctx.correlation_id_or_new();
        info!(
            "Subagent {} handling query (timezone {}, correlation {}): {}",
            self.domain, ctx.timezone, correlation_id, query
        );

        match self.try_answer(ctx, &correlation_id, query).await {
            Ok(text) if !text.is_empty() => text,
            Ok(_) => {
                warn!("Subagent {} produced no text", self.domain);
                self.domain.apology()
            }
            Err(e) => {
                error!("Error in {} analysis: {}", self.domain.label(), e);
                format!("Error processing {} query: {}", self.domain.label(), e)
            }
        }
    }

    async fn try_answer(
        &self,
        ctx: &RequestContext,
        correlation_id: &str,
        query: &str,
    ) -> Result<String> {
        let credentials = self
            .services
            .secrets
            .get_secret(self.services.secret_ref.as_deref())
            .await?;

        let session = self.services.launcher.launch(&credentials).await?;
        let outcome = self.run(&session, ctx, correlation_id, query).await;
        if let Err(e) = session.close().await {
            warn!("Failed to close tool server for {}: {}", self.domain, e);
        }
        outcome
    }

    async fn run(
        &self,
        session: &ToolServerSession,
        ctx: &RequestContext,
        correlation_id: &str,
        query: &str,
    ) -> Result<String> {
        let mut tools = session.tools().await?;
        tools.extend(ToolSet::utilities());

        let system_prompt = Prompts::render(
            self.domain.prompt(&self.services.prompts),
            &ctx.timezone,
            &self.services.table,
        );
        let prompt = self.domain.format_query(query);

        let agent = Agent::new(self.services.model.clone(), &system_prompt, tools)
            .with_max_iterations(self.services.max_iterations);

        let mut correlator = ToolCallCorrelator::new(
            self.services.audit.clone(),
            correlation_id,
            prompt.as_str(),
            Some(self.domain.tool_name().to_string()),
        );

        // The domain run shares the caller's identity under this correlation id.
        let run_ctx = RequestContext {
            correlation_id: correlation_id.to_string(),
            ..ctx.clone()
        };

        process_agent_stream(agent.stream(run_ctx, &prompt), &mut correlator).await
    }
}

#[async_trait]
impl Tool for Subagent {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.domain.tool_name().to_string(),
            description: self.domain.description().to_string(),
            input_schema: serde_json::json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "The user's question for this domain"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    async fn call(&self, ctx: &RequestContext, input: Value) -> Result<String> {
        let args: SubagentArgs = parse_args(self.domain.tool_name(), input)?;
        Ok(self.answer(ctx, &args.query).await)
    }
}
