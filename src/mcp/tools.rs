//! Tools exposed over MCP.

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use tracing::debug;

use super::errors::McpError;
use super::protocol::{CallToolResult, Tool};
use super::server::ToolHandler;
use crate::doctors::DoctorDirectory;

pub const LIST_DOCTORS: &str = "list_doctors";

/// Doctor directory search by state and optional specialty
pub struct ListDoctorsHandler {
    directory: Arc<DoctorDirectory>,
}

impl ListDoctorsHandler {
    #[inline]
    pub fn new(directory: Arc<DoctorDirectory>) -> Self {
        Self { directory }
    }

    fn string_argument<'a>(
        arguments: &'a Map<String, Value>,
        name: &str,
    ) -> Result<Option<&'a str>, McpError> {
        match arguments.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(McpError::InvalidToolArguments {
                tool: LIST_DOCTORS.to_string(),
                message: format!("'{name}' must be a string, got {other}"),
            }),
        }
    }
}

#[async_trait]
impl ToolHandler for ListDoctorsHandler {
    fn definition(&self) -> Tool {
        Tool {
            name: LIST_DOCTORS.to_string(),
            description: "List up to five doctors practising in a US state, optionally \
                          filtered by medical specialty"
                .to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "state": {
                        "type": "string",
                        "description": "Two-letter US state code, e.g. 'GA'"
                    },
                    "specialty": {
                        "type": "string",
                        "description": "Optional medical specialty, e.g. 'Cardiology'"
                    }
                },
                "required": ["state"],
                "additionalProperties": false
            }),
        }
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<CallToolResult, McpError> {
        let state = Self::string_argument(&arguments, "state")?
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| McpError::InvalidToolArguments {
                tool: LIST_DOCTORS.to_string(),
                message: "missing required argument 'state'".to_string(),
            })?;
        let specialty = Self::string_argument(&arguments, "specialty")?;

        debug!("list_doctors state={} specialty={:?}", state, specialty);

        let output = self.directory.list_doctors(state, specialty).await;
        Ok(CallToolResult::text(output))
    }
}
