//! Line-delimited JSON-RPC server loop.
//!
//! One message per line in, one response per request out. Notifications
//! never get a reply. The loop is generic over the transport so tests can
//! drive it through an in-memory pipe instead of stdio.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::errors::McpError;
use super::protocol::*;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Uninitialized,
    Initializing,
    Ready,
    Closed,
}

#[async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> Tool;

    async fn call(
        &self,
        arguments: Map<String, Value>,
    ) -> std::result::Result<CallToolResult, McpError>;
}

pub struct McpServer {
    info: Implementation,
    instructions: Option<String>,
    tools: BTreeMap<String, Box<dyn ToolHandler>>,
    state: RwLock<ConnectionState>,
}

impl std::fmt::Debug for McpServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("McpServer")
            .field("info", &self.info)
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl McpServer {
    #[inline]
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            info: Implementation {
                name: name.into(),
                version: version.into(),
            },
            instructions: None,
            tools: BTreeMap::new(),
            state: RwLock::new(ConnectionState::Uninitialized),
        }
    }

    #[inline]
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    #[inline]
    pub fn with_tool<H>(mut self, handler: H) -> Self
    where
        H: ToolHandler + 'static,
    {
        let name = handler.definition().name;
        debug!("Registered tool: {}", name);
        self.tools.insert(name, Box::new(handler));
        self
    }

    #[inline]
    pub fn tool_names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    #[inline]
    pub async fn connection_state(&self) -> ConnectionState {
        *self.state.read().await
    }

    async fn set_state(&self, state: ConnectionState) {
        *self.state.write().await = state;
    }

    #[inline]
    pub async fn serve_stdio(&self) -> Result<()> {
        info!("Starting MCP server on stdio");
        self.serve(tokio::io::stdin(), tokio::io::stdout()).await
    }

    /// Serve until `reader` reaches EOF
    #[inline]
    pub async fn serve<R, W>(&self, reader: R, mut writer: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            if let Some(reply) = self.handle_line(line).await {
                let mut encoded = serde_json::to_string(&reply)
                    .map_err(|e| McpError::Internal(e.to_string()))?;
                encoded.push('\n');
                writer.write_all(encoded.as_bytes()).await?;
                writer.flush().await?;
            }
        }

        self.set_state(ConnectionState::Closed).await;
        info!("MCP client disconnected");
        Ok(())
    }

    /// Reply for one raw line, if it needs one
    #[inline]
    pub async fn handle_line(&self, line: &str) -> Option<JsonRpcMessage> {
        let message = match serde_json::from_str::<Value>(line) {
            Ok(value) => serde_json::from_value::<JsonRpcMessage>(value)
                .map_err(|e| McpError::InvalidRequest(e.to_string())),
            Err(e) => Err(McpError::Parse(e.to_string())),
        };

        let message = match message {
            Ok(message) if message.jsonrpc() == JSONRPC_VERSION => message,
            Ok(message) => {
                let error = McpError::InvalidRequest(format!(
                    "unsupported jsonrpc version '{}'",
                    message.jsonrpc()
                ));
                error.log();
                return Some(JsonRpcMessage::error(None, error.to_jsonrpc_error()));
            }
            Err(error) => {
                error.log();
                return Some(JsonRpcMessage::error(None, error.to_jsonrpc_error()));
            }
        };

        match message {
            JsonRpcMessage::Request(request) => {
                let id = request.id.clone();
                Some(match self.handle_request(request).await {
                    Ok(result) => JsonRpcMessage::result(id, result),
                    Err(error) => {
                        error.log();
                        JsonRpcMessage::error(Some(id), error.to_jsonrpc_error())
                    }
                })
            }
            JsonRpcMessage::Notification(notification) => {
                self.handle_notification(&notification).await;
                None
            }
            JsonRpcMessage::Response(_) | JsonRpcMessage::ErrorResponse(_) => {
                warn!("Ignoring response message sent by client");
                None
            }
        }
    }

    async fn handle_request(&self, request: JsonRpcRequest) -> std::result::Result<Value, McpError> {
        debug!("MCP request {}", request.method);

        match request.method.as_str() {
            "initialize" => self.initialize(request.params).await,
            "ping" => Ok(json!({})),
            "tools/list" => self.list_tools(),
            "tools/call" => self.call_tool(request.params).await,
            other => Err(McpError::MethodNotFound(other.to_string())),
        }
    }

    async fn handle_notification(&self, notification: &JsonRpcNotification) {
        match notification.method.as_str() {
            "initialized" | "notifications/initialized" => {
                self.set_state(ConnectionState::Ready).await;
                info!("MCP session ready");
            }
            "notifications/cancelled" => debug!("Client cancelled a request"),
            other => debug!("Ignoring notification {}", other),
        }
    }

    async fn initialize(&self, params: Option<Value>) -> std::result::Result<Value, McpError> {
        let params: InitializeParams = parse_params("initialize", params)?;

        let protocol_version = if SUPPORTED_VERSIONS.contains(&params.protocol_version.as_str()) {
            params.protocol_version
        } else {
            warn!(
                "Client requested protocol {}, offering {}",
                params.protocol_version, MCP_VERSION
            );
            MCP_VERSION.to_string()
        };

        self.set_state(ConnectionState::Initializing).await;
        info!(
            "Initializing MCP session for {} {} (protocol {})",
            params.client_info.name, params.client_info.version, protocol_version
        );

        to_value(InitializeResult {
            protocol_version,
            capabilities: ServerCapabilities {
                tools: Some(ToolsCapability {
                    list_changed: false,
                }),
            },
            server_info: self.info.clone(),
            instructions: self.instructions.clone(),
        })
    }

    fn list_tools(&self) -> std::result::Result<Value, McpError> {
        to_value(ListToolsResult {
            tools: self.tools.values().map(|h| h.definition()).collect(),
        })
    }

    async fn call_tool(&self, params: Option<Value>) -> std::result::Result<Value, McpError> {
        let params: CallToolParams = parse_params("tools/call", params)?;

        let handler = self
            .tools
            .get(&params.name)
            .ok_or_else(|| McpError::ToolNotFound(params.name.clone()))?;

        debug!("Calling tool {}", params.name);
        to_value(handler.call(params.arguments).await?)
    }
}

fn parse_params<T>(method: &str, params: Option<Value>) -> std::result::Result<T, McpError>
where
    T: serde::de::DeserializeOwned,
{
    let params = params.ok_or_else(|| McpError::InvalidParams {
        method: method.to_string(),
        message: "missing params".to_string(),
    })?;

    serde_json::from_value(params).map_err(|e| McpError::InvalidParams {
        method: method.to_string(),
        message: e.to_string(),
    })
}

fn to_value<T: serde::Serialize>(result: T) -> std::result::Result<Value, McpError> {
    serde_json::to_value(result).map_err(|e| McpError::Internal(e.to_string()))
}
