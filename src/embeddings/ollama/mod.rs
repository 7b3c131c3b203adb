
use anyhow::{Context, Result, anyhow, bail};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::AgentError;
use crate::config::OllamaConfig;
use crate::embeddings::EmbeddingProvider;
use crate::http::{self, RetryPolicy};

/// Output size of `nomic-embed-text`
pub const DEFAULT_EMBEDDING_DIMENSION: u32 = 768;

#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: Url,
    model: String,
    batch_size: u32,
    dimension: usize,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

#[derive(Debug, Deserialize)]
pub struct ModelInfo {
    pub name: String,
    pub size: Option<u64>,
    pub digest: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelsResponse {
    models: Vec<ModelInfo>,
}

impl OllamaClient {
    #[inline]
    pub fn new(config: &OllamaConfig) -> Result<Self> {
        let base_url = config
            .ollama_url()
            .context("Failed to generate Ollama URL from config")?;

        Ok(Self {
            base_url,
            model: config.model.clone(),
            batch_size: config.batch_size.max(1),
            dimension: config.embedding_dimension as usize,
            agent: http::build_agent(config.timeout()),
            retry: RetryPolicy::new(config.retry_attempts),
        })
    }

    #[inline]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.agent = http::build_agent(timeout);
        self
    }

    #[inline]
    pub fn with_retry_attempts(mut self, attempts: u32) -> Self {
        self.retry = RetryPolicy {
            attempts: attempts.max(1),
            ..self.retry
        };
        self
    }

    #[inline]
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base_url
            .join(path)
            .with_context(|| format!("Invalid Ollama endpoint {path}"))
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        let url = self.endpoint(path)?;
        let body = http::send_with_retry(url.as_str(), self.retry, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        serde_json::from_str(&body).with_context(|| format!("Unexpected response from {url}"))
    }

    fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let url = self.endpoint(path)?;
        let payload = serde_json::to_string(body)?;
        let reply = http::send_with_retry(url.as_str(), self.retry, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&payload)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        serde_json::from_str(&reply).with_context(|| format!("Unexpected response from {url}"))
    }

    /// Reachability plus [`validate_model`](Self::validate_model)
    #[inline]
    pub fn health_check(&self) -> Result<()> {
        self.validate_model()
            .with_context(|| format!("Ollama at {} is not ready", self.base_url))?;

        info!("Ollama at {} serves {}", self.base_url, self.model);
        Ok(())
    }

    /// Fails unless the server has the configured model pulled. A missing
    /// `:latest` tag on either side still matches.
    #[inline]
    pub fn validate_model(&self) -> Result<()> {
        let installed = self.list_models()?;
        let wanted = self.model.trim_end_matches(":latest");

        if installed
            .iter()
            .any(|m| m.name.trim_end_matches(":latest") == wanted)
        {
            return Ok(());
        }

        let names: Vec<&str> = installed.iter().map(|m| m.name.as_str()).collect();
        warn!("{} is not pulled on {}; have {:?}", self.model, self.base_url, names);
        Err(anyhow!(
            "Model '{}' is not available. Available models: {:?}",
            self.model,
            names
        ))
    }

    #[inline]
    pub fn list_models(&self) -> Result<Vec<ModelInfo>> {
        let tags: ModelsResponse = self
            .get_json("/api/tags")
            .context("Failed to list Ollama models")?;

        debug!("{} reports {} models", self.base_url, tags.models.len());
        Ok(tags.models)
    }

    /// Embed `texts` in requests of at most `batch_size` inputs
    #[inline]
    pub fn embed_blocking(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut vectors = Vec::with_capacity(texts.len());

        for (batch, inputs) in texts.chunks(self.batch_size as usize).enumerate() {
            let response: EmbedResponse = self
                .post_json(
                    "/api/embed",
                    &EmbedRequest {
                        model: &self.model,
                        input: inputs,
                    },
                )
                .with_context(|| format!("Embedding batch {batch} failed"))?;

            if response.embeddings.len() != inputs.len() {
                bail!(
                    "Ollama returned {} embeddings for {} inputs",
                    response.embeddings.len(),
                    inputs.len()
                );
            }
            vectors.extend(response.embeddings);
        }

        debug!("Embedded {} texts with {}", vectors.len(), self.model);
        Ok(vectors)
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaClient {
    #[inline]
    fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    fn dimension(&self) -> usize {
        self.dimension
    }

    #[inline]
    async fn embed_batch(&self, texts: &[String]) -> crate::Result<Vec<Vec<f32>>> {
        let client = self.clone();
        let texts = texts.to_vec();

        http::run_blocking(move || client.embed_blocking(&texts))
            .await
            .map_err(|e| AgentError::Embedding(format!("{e:#}")))
    }
}
