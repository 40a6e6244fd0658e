//! Tools an agent can call.
//!
//! Everything an agent run can invoke implements [`Tool`]: the local utility
//! tools in this module, tools exposed by a tool server, and (for the
//! orchestrator) the domain subagents themselves. The request context is
//! passed to every call.

mod calculator;
mod time;

pub use calculator::{evaluate, Calculator};
pub use time::CurrentTime;

use crate::context::RequestContext;
use crate::error::{Result, StreamLensError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Name, description and JSON schema of a callable tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "empty_object_schema")]
    pub input_schema: Value,
}

fn empty_object_schema() -> Value {
    serde_json::json!({ "type": "object", "properties": {} })
}

/// A capability an agent can invoke by name.
#[async_trait]
pub trait Tool: Send + Sync {
    fn definition(&self) -> ToolDefinition;

    /// Run the tool with its JSON input and return text for the model.
    async fn call(&self, ctx: &RequestContext, input: Value) -> Result<String>;
}

/// Ordered collection of tools, looked up by name.
#[derive(Clone, Default)]
pub struct ToolSet {
    tools: Vec<Arc<dyn Tool>>,
}

impl ToolSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// The generic utility tools every agent gets (time and calculator).
    pub fn utilities() -> Self {
        let mut set = Self::new();
        set.push(Arc::new(CurrentTime));
        set.push(Arc::new(Calculator));
        set
    }

    /// Add a tool. A later tool with the same name shadows an earlier one.
    pub fn push(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.definition().name;
        self.tools.retain(|t| t.definition().name != name);
        self.tools.push(tool);
    }

    pub fn extend(&mut self, other: ToolSet) {
        for tool in other.tools {
            self.push(tool);
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.definition().name).collect()
    }

    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.iter().map(|t| t.definition()).collect()
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.definition().name == name)
    }

    /// Call a tool by name.
    pub async fn call(&self, ctx: &RequestContext, name: &str, input: Value) -> Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| StreamLensError::tool(format!("Unknown tool: {}", name)))?;
        tool.call(ctx, input).await
    }
}

impl std::fmt::Debug for ToolSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolSet").field("tools", &self.names()).finish()
    }
}

/// Deserialize a tool's JSON input into its argument struct.
pub(crate) fn parse_args<T: serde::de::DeserializeOwned>(tool: &str, input: Value) -> Result<T> {
    let input = if input.is_null() {
        serde_json::json!({})
    } else {
        input
    };
    serde_json::from_value(input)
        .map_err(|e| StreamLensError::tool(format!("Invalid arguments for {}: {}", tool, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_utilities() {
        let tools = ToolSet::utilities();
        assert_eq!(tools.names(), vec!["current_time", "calculator"]);
    }

    #[tokio::test]
    async fn test_call_by_name() {
        let tools = ToolSet::utilities();
        let ctx = RequestContext::default();
        let out = tools
            .call(&ctx, "calculator", serde_json::json!({ "expression": "6*7" }))
            .await
            .unwrap();
        assert_eq!(out, "42");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let tools = ToolSet::utilities();
        let err = tools
            .call(&RequestContext::default(), "nope", Value::Null)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Unknown tool: nope"));
    }

    #[test]
    fn test_push_shadows_same_name() {
        let mut tools = ToolSet::utilities();
        tools.push(Arc::new(Calculator));
        assert_eq!(tools.len(), 2);
        assert_eq!(tools.names(), vec!["current_time", "calculator"]);
    }

    #[test]
    fn test_definition_defaults() {
        let def: ToolDefinition =
            serde_json::from_value(serde_json::json!({ "name": "run_select_query" })).unwrap();
        assert_eq!(def.description, "");
        assert_eq!(def.input_schema["type"], "object");
    }
}
