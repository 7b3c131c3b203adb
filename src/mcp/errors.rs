// Failures while serving one MCP request, and their JSON-RPC codes

use thiserror::Error;
use tracing::{error, warn};

use super::protocol::{JsonRpcError, error_codes};

#[derive(Error, Debug)]
pub enum McpError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Method not found: {0}")]
    MethodNotFound(String),

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParams { method: String, message: String },

    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    #[error("Invalid arguments for tool '{tool}': {message}")]
    InvalidToolArguments { tool: String, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl McpError {
    #[inline]
    pub fn code(&self) -> i32 {
        match self {
            Self::Parse(_) => error_codes::PARSE_ERROR,
            Self::InvalidRequest(_) => error_codes::INVALID_REQUEST,
            Self::MethodNotFound(_) => error_codes::METHOD_NOT_FOUND,
            Self::InvalidParams { .. }
            | Self::ToolNotFound(_)
            | Self::InvalidToolArguments { .. } => error_codes::INVALID_PARAMS,
            Self::Internal(_) => error_codes::INTERNAL_ERROR,
        }
    }

    #[inline]
    pub fn to_jsonrpc_error(&self) -> JsonRpcError {
        JsonRpcError {
            code: self.code(),
            message: self.to_string(),
            data: None,
        }
    }

    /// Client mistakes are warnings; server faults are errors
    #[inline]
    pub fn log(&self) {
        match self {
            Self::Internal(_) => error!("MCP request failed: {}", self),
            _ => warn!("Rejected MCP request: {}", self),
        }
    }
}

impl From<McpError> for crate::AgentError {
    #[inline]
    fn from(error: McpError) -> Self {
        Self::Mcp(error.to_string())
    }
}
