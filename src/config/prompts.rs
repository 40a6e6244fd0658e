//! System prompt templates for StreamLens.
//!
//! Every prompt has a built-in default. A prompts directory may override any
//! of them with a `<name>.txt` file; unreadable files fall back to the default.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, warn};

const ORCHESTRATOR: &str = r#"You are an intelligent assistant orchestrator for streaming video analytics. Your role is to understand user requests and route them to the appropriate specialized subagent. You have access to:

- timeseries_agent: For general time-series data queries, CMCD metrics and combined analysis
- qoe_analysis_agent: For Quality of Experience analysis (buffer health, bitrate, session quality, rebuffering)
- cache_origin_agent: For cache efficiency, origin performance, error rates and bandwidth analysis
- current_time and calculator: For time lookups and arithmetic

The user's timezone is {timezone}. Always use the appropriate subagent tool to handle data questions. Provide helpful, conversational responses."#;

const TIMESERIES: &str = r#"You are a specialized Time-Series Data Analyst with expertise in analyzing streaming video analytics, CDN performance and time-series diagnostics. You can execute SQL queries using ClickHouse dialect against the table {table}, interpret time-series data and provide actionable insights.

Report times in the user's timezone ({timezone})."#;

const QOE_ANALYSIS: &str = r#"You are a specialized Quality of Experience (QoE) Analyst with expertise in analyzing streaming video quality metrics, buffer health, bitrate adaptation and viewer experience. You can execute SQL queries using ClickHouse dialect against the table {table} and provide actionable QoE insights.

Report times in the user's timezone ({timezone})."#;

const CACHE_ORIGIN: &str = r#"You are a specialized CDN Cache & Origin Performance Analyst with expertise in analyzing cache efficiency, origin server performance and content delivery optimization. You can execute SQL queries using ClickHouse dialect against the table {table} and provide actionable CDN insights.

Report times in the user's timezone ({timezone})."#;

/// Collection of all prompt templates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prompts {
    pub orchestrator: String,
    pub timeseries: String,
    pub qoe_analysis: String,
    pub cache_origin: String,
}

impl Default for Prompts {
    fn default() -> Self {
        Self {
            orchestrator: ORCHESTRATOR.to_string(),
            timeseries: TIMESERIES.to_string(),
            qoe_analysis: QOE_ANALYSIS.to_string(),
            cache_origin: CACHE_ORIGIN.to_string(),
        }
    }
}

impl Prompts {
    /// Load prompts, letting `<dir>/<name>.txt` override each built-in.
    pub fn load(dir: Option<&Path>) -> Self {
        let mut prompts = Prompts::default();

        let Some(dir) = dir else {
            return prompts;
        };

        for (name, slot) in [
            ("orchestrator", &mut prompts.orchestrator),
            ("timeseries", &mut prompts.timeseries),
            ("qoe_analysis", &mut prompts.qoe_analysis),
            ("cache_origin", &mut prompts.cache_origin),
        ] {
            let path = dir.join(format!("{}.txt", name));
            if !path.exists() {
                continue;
            }
            match std::fs::read_to_string(&path) {
                Ok(content) if !content.trim().is_empty() => {
                    debug!("Loaded prompt {} from {:?}", name, path);
                    *slot = content;
                }
                Ok(_) => warn!("Prompt file {:?} is empty, using built-in", path),
                Err(e) => warn!("Failed to read prompt {:?}: {}, using built-in", path, e),
            }
        }

        prompts
    }

    /// Substitute the `{timezone}` and `{table}` placeholders.
    pub fn render(template: &str, timezone: &str, table: &str) -> String {
        template
            .replace("{timezone}", timezone)
            .replace("{hydrolix_table}", table)
            .replace("{table}", table)
    }
}
