//! JSON-RPC client for a tool server speaking MCP over newline-delimited stdio.

use super::protocol::*;
use super::ToolServer;
use crate::error::{Result, StreamLensError};
use crate::tools::ToolDefinition;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::process::Child;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

type Reader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type Writer = Box<dyn AsyncWrite + Send + Unpin>;

struct Transport {
    reader: Reader,
    writer: Writer,
    child: Option<Child>,
}

/// An initialized MCP session.
pub struct McpClient {
    transport: Mutex<Transport>,
    request_id: AtomicU64,
    server_name: String,
}

impl McpClient {
    /// Perform the initialize handshake over an already-open byte stream.
    ///
    /// `child` is the server process, if any; it is killed on [`close`](ToolServer::close)
    /// or when the client is dropped.
    pub async fn connect<R, W>(reader: R, writer: W, child: Option<Child>) -> Result<Self>
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let mut transport = Transport {
            reader: BufReader::new(Box::new(reader)),
            writer: Box::new(writer),
            child,
        };
        let request_id = AtomicU64::new(1);

        let params = serde_json::to_value(InitializeParams::default())?;
        let request = JsonRpcRequest::call(request_id.fetch_add(1, Ordering::SeqCst), "initialize", Some(params));
        let response = Self::round_trip(&mut transport, &request).await?;
        let result: InitializeResult = match Self::into_result("initialize", response)? {
            Value::Null => InitializeResult::default(),
            value => serde_json::from_value(value).unwrap_or_default(),
        };

        Self::send(
            &mut transport.writer,
            &JsonRpcRequest::notification("notifications/initialized", None),
        )
        .await?;

        let server_name = result
            .server_info
            .map(|info| info.name)
            .unwrap_or_else(|| "unknown".to_string());
        info!(
            "Connected to tool server {} (protocol {})",
            server_name, result.protocol_version
        );

        Ok(Self {
            transport: Mutex::new(transport),
            request_id,
            server_name,
        })
    }

    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    async fn request(&self, method: &str, params: Option<Value>) -> Result<Value> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let request = JsonRpcRequest::call(id, method, params);

        let mut transport = self.transport.lock().await;
        let response = Self::round_trip(&mut transport, &request).await?;
        Self::into_result(method, response)
    }

    async fn round_trip(transport: &mut Transport, request: &JsonRpcRequest) -> Result<JsonRpcResponse> {
        Self::send(&mut transport.writer, request).await?;
        Self::read_response(&mut transport.reader, request.id).await
    }

    async fn send(writer: &mut Writer, request: &JsonRpcRequest) -> Result<()> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        writer
            .write_all(line.as_bytes())
            .await
            .map_err(|e| protocol_error(format!("Failed to write to tool server: {}", e)))?;
        writer
            .flush()
            .await
            .map_err(|e| protocol_error(format!("Failed to flush tool server stdin: {}", e)))?;
        debug!("-> {}", request.method);
        Ok(())
    }

    /// Read lines until the response for `id` arrives. Blank lines, log output
    /// and server notifications are skipped.
    async fn read_response(reader: &mut Reader, id: Option<u64>) -> Result<JsonRpcResponse> {
        let mut line = String::new();
        loop {
            line.clear();
            let bytes_read = reader
                .read_line(&mut line)
                .await
                .map_err(|e| protocol_error(format!("Failed to read from tool server: {}", e)))?;

            if bytes_read == 0 {
                return Err(protocol_error(
                    "Tool server closed its output (process may have exited)",
                ));
            }

            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match serde_json::from_str::<JsonRpcResponse>(trimmed) {
                Ok(response) if response.id.as_ref().and_then(Value::as_u64) == id => {
                    return Ok(response)
                }
                Ok(_) => debug!("Skipping unrelated message from tool server"),
                Err(_) => debug!("Skipping non-JSON output: {}", trimmed),
            }
        }
    }

    fn into_result(method: &str, response: JsonRpcResponse) -> Result<Value> {
        if let Some(error) = response.error {
            return Err(protocol_error(format!("{} failed: {}", method, error)));
        }
        Ok(response.result.unwrap_or(Value::Null))
    }
}

#[async_trait]
impl ToolServer for McpClient {
    async fn list_tools(&self) -> Result<Vec<ToolDefinition>> {
        let result = self.request("tools/list", None).await?;
        let list: ToolsListResult = serde_json::from_value(result)
            .map_err(|e| protocol_error(format!("Invalid tools/list result: {}", e)))?;
        debug!("Tool server {} offers {} tools", self.server_name, list.tools.len());
        Ok(list.tools)
    }

    async fn call_tool(&self, name: &str, arguments: Value) -> Result<String> {
        let params = serde_json::to_value(ToolCallParams {
            name: name.to_string(),
            arguments,
        })?;
        let result = self.request("tools/call", Some(params)).await?;
        let result: ToolCallResult = serde_json::from_value(result)
            .map_err(|e| protocol_error(format!("Invalid tools/call result: {}", e)))?;

        if result.is_error() {
            return Err(protocol_error(format!(
                "Tool {} returned an error: {}",
                name,
                result.text()
            )));
        }
        Ok(result.text())
    }

    async fn close(&self) -> Result<()> {
        let mut transport = self.transport.lock().await;
        if let Err(e) = transport.writer.shutdown().await {
            debug!("Tool server stdin already closed: {}", e);
        }

        if let Some(mut child) = transport.child.take() {
            if let Err(e) = child.kill().await {
                warn!("Failed to stop tool server: {}", e);
            }
            info!("Tool server {} shut down", self.server_name);
        }
        Ok(())
    }
}

#[track_caller]
fn protocol_error(msg: impl Into<String>) -> StreamLensError {
    StreamLensError::tool_protocol(msg.into())
}
