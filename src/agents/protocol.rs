// ACP wire types, restricted to synchronous text runs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const TEXT_PLAIN: &str = "text/plain";

fn default_content_type() -> String {
    TEXT_PLAIN.to_string()
}

fn default_role() -> String {
    "user".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePart {
    #[serde(default)]
    pub content: String,
    #[serde(default = "default_content_type")]
    pub content_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default = "default_role")]
    pub role: String,
    #[serde(default)]
    pub parts: Vec<MessagePart>,
}

impl Message {
    #[inline]
    pub fn user(text: impl Into<String>) -> Self {
        Self::text("user", text)
    }

    #[inline]
    pub fn agent(text: impl Into<String>) -> Self {
        Self::text("agent", text)
    }

    fn text(role: &str, text: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            parts: vec![MessagePart {
                content: text.into(),
                content_type: TEXT_PLAIN.to_string(),
            }],
        }
    }

    /// Content of the first part, if any
    #[inline]
    pub fn first_text(&self) -> Option<&str> {
        self.parts.first().map(|part| part.content.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    #[default]
    Sync,
    Async,
    Stream,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunRequest {
    pub agent_name: String,
    #[serde(default)]
    pub input: Vec<Message>,
    #[serde(default)]
    pub mode: RunMode,
}

impl RunRequest {
    #[inline]
    pub fn sync(agent_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            agent_name: agent_name.into(),
            input: vec![Message::user(text)],
            mode: RunMode::Sync,
        }
    }

    /// Text of the first part of the first message, ignoring blank input
    #[inline]
    pub fn input_text(&self) -> Option<&str> {
        self.input
            .first()
            .and_then(Message::first_text)
            .filter(|text| !text.trim().is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RunStatus {
    Created,
    InProgress,
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunResponse {
    pub run_id: Uuid,
    pub agent_name: String,
    pub status: RunStatus,
    #[serde(default)]
    pub output: Vec<Message>,
}

impl RunResponse {
    #[inline]
    pub fn completed(agent_name: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            agent_name: agent_name.into(),
            status: RunStatus::Completed,
            output: vec![Message::agent(text)],
        }
    }

    /// Concatenated text of every output part
    #[inline]
    pub fn output_text(&self) -> String {
        self.output
            .iter()
            .flat_map(|message| &message.parts)
            .map(|part| part.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentList {
    pub agents: Vec<AgentManifest>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}
