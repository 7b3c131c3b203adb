
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::AgentError;
use crate::config::LlmConfig;
use crate::http::{self, RetryPolicy};
use crate::llm::CompletionProvider;

/// Client for any `/chat/completions` endpoint speaking the OpenAI wire format
#[derive(Clone)]
pub struct ChatClient {
    endpoint: String,
    model: String,
    temperature: f32,
    api_key: String,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl std::fmt::Debug for ChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

impl ChatClient {
    /// Build a client from config, reading the API key from the environment
    #[inline]
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let api_key = config.api_key()?;
        Ok(Self::with_api_key(config, api_key))
    }

    #[inline]
    pub fn with_api_key(config: &LlmConfig, api_key: String) -> Self {
        Self {
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            model: config.model.clone(),
            temperature: config.temperature,
            api_key,
            agent: http::build_agent(config.timeout()),
            retry: RetryPolicy::new(config.retry_attempts),
        }
    }

    #[inline]
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    #[inline]
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = http::build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    /// Send a single user message and return the first choice's content
    #[inline]
    pub fn complete_blocking(&self, prompt: &str) -> Result<String> {
        let request = ChatRequest {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: self.temperature,
        };

        let request_json =
            serde_json::to_string(&request).context("Failed to serialize chat request")?;
        let authorization = format!("Bearer {}", self.api_key);

        debug!(
            "Chat completion request to {} (model {}, prompt length {})",
            self.endpoint,
            self.model,
            prompt.len()
        );

        let response_text = http::send_with_retry(&self.endpoint, self.retry, || {
            self.agent
                .post(self.endpoint.as_str())
                .header("Authorization", authorization.as_str())
                .header("Content-Type", "application/json")
                .send(&request_json)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
        .context("Chat completion request failed")?;

        let response: ChatResponse =
            serde_json::from_str(&response_text).context("Failed to parse chat response")?;

        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| anyhow::anyhow!("missing choices[0].message.content"))
    }
}

#[async_trait]
impl CompletionProvider for ChatClient {
    #[inline]
    async fn complete(&self, prompt: &str) -> crate::Result<String> {
        let client = self.clone();
        let prompt = prompt.to_string();

        http::run_blocking(move || client.complete_blocking(&prompt))
            .await
            .map_err(|e| AgentError::Completion(format!("{e:#}")))
    }
}
