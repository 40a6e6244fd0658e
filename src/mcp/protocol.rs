//! MCP protocol types (JSON-RPC 2.0), client side.

use crate::tools::ToolDefinition;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const CLIENT_NAME: &str = "streamlens";
pub const CLIENT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// JSON-RPC request. Notifications carry no id.
#[derive(Debug, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn call(id: u64, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: Some(id),
            method: method.to_string(),
            params,
        }
    }

    pub fn notification(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: None,
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC response.
#[derive(Debug, Deserialize)]
pub struct JsonRpcResponse {
    #[serde(default)]
    pub id: Option<Value>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub data: Option<Value>,
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

/// MCP Initialize request params.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    pub protocol_version: String,
    pub capabilities: Value,
    pub client_info: ClientInfo,
}

impl Default for InitializeParams {
    fn default() -> Self {
        Self {
            protocol_version: PROTOCOL_VERSION.to_string(),
            capabilities: serde_json::json!({}),
            client_info: ClientInfo {
                name: CLIENT_NAME.to_string(),
                version: CLIENT_VERSION.to_string(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ClientInfo {
    pub name: String,
    pub version: String,
}

/// MCP Initialize response. Only the fields the client logs.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InitializeResult {
    pub protocol_version: String,
    pub server_info: Option<ServerInfo>,
}

#[derive(Debug, Deserialize)]
pub struct ServerInfo {
    pub name: String,
    #[allow(dead_code)]
    #[serde(default)]
    pub version: String,
}

/// Tools list response.
#[derive(Debug, Deserialize)]
pub struct ToolsListResult {
    #[serde(default)]
    pub tools: Vec<ToolDefinition>,
}

/// Tool call request params.
#[derive(Debug, Serialize)]
pub struct ToolCallParams {
    pub name: String,
    pub arguments: Value,
}

/// Tool call response.
#[derive(Debug, Deserialize)]
pub struct ToolCallResult {
    #[serde(default)]
    pub content: Vec<ToolContent>,
    #[serde(rename = "isError", default)]
    pub is_error: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ToolContent {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

impl ToolCallResult {
    /// Concatenated text content.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|c| match c {
                ToolContent::Text { text } => Some(text.as_str()),
                ToolContent::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn is_error(&self) -> bool {
        self.is_error.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_notification_has_no_id() {
        let json = serde_json::to_value(JsonRpcRequest::notification(
            "notifications/initialized",
            None,
        ))
        .unwrap();
        assert_eq!(
            json,
            serde_json::json!({ "jsonrpc": "2.0", "method": "notifications/initialized" })
        );
    }

    #[test]
    fn test_tool_call_result_text() {
        let result: ToolCallResult = serde_json::from_value(serde_json::json!({
            "content": [
                { "type": "text", "text": "hits,total" },
                { "type": "image", "data": "..." },
                { "type": "text", "text": "92,100" }
            ]
        }))
        .unwrap();
        assert_eq!(result.text(), "hits,total\n92,100");
        assert!(!result.is_error());
    }

    #[test]
    fn test_tools_list_uses_input_schema() {
        let result: ToolsListResult = serde_json::from_value(serde_json::json!({
            "tools": [{
                "name": "run_select_query",
                "description": "Run a SELECT query",
                "inputSchema": { "type": "object", "properties": { "query": { "type": "string" } } }
            }]
        }))
        .unwrap();
        assert_eq!(result.tools[0].name, "run_select_query");
        assert!(result.tools[0].input_schema["properties"]["query"].is_object());
    }
}
