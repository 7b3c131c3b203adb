//! Blocking ACP client, driven from async code through the blocking pool.


use anyhow::{Context, Result, anyhow};
use std::time::Duration;
use tracing::debug;
use url::Url;

use super::protocol::{AgentList, AgentManifest, RunRequest, RunResponse, RunStatus};
use crate::http::{self, RetryPolicy};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone)]
pub struct AcpClient {
    base_url: Url,
    agent: ureq::Agent,
    retry: RetryPolicy,
}

impl AcpClient {
    #[inline]
    pub fn new(base_url: &str) -> Result<Self> {
        // Without a trailing slash `Url::join` would replace the last segment
        let normalized = format!("{}/", base_url.trim_end_matches('/'));
        let base_url =
            Url::parse(&normalized).with_context(|| format!("Invalid ACP server URL: {base_url}"))?;

        Ok(Self {
            base_url,
            agent: http::build_agent(DEFAULT_TIMEOUT),
            retry: RetryPolicy::default(),
        })
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
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> Result<String> {
        Ok(self.base_url.join(path)?.to_string())
    }

    fn get(&self, path: &str) -> Result<String> {
        let url = self.endpoint(path)?;
        http::send_with_retry(&url, self.retry, || {
            self.agent
                .get(url.as_str())
                .call()
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })
    }

    #[inline]
    pub fn ping_blocking(&self) -> Result<()> {
        self.get("ping")
            .with_context(|| format!("ACP server at {} is not reachable", self.base_url))?;
        Ok(())
    }

    #[inline]
    pub fn list_agents_blocking(&self) -> Result<Vec<AgentManifest>> {
        let body = self.get("agents")?;
        let list: AgentList =
            serde_json::from_str(&body).context("Failed to parse ACP agent list")?;

        debug!("{} advertises {} agents", self.base_url, list.agents.len());
        Ok(list.agents)
    }

    /// Run `agent_name` synchronously and return its output text
    #[inline]
    pub fn run_sync_blocking(&self, agent_name: &str, input: &str) -> Result<String> {
        let url = self.endpoint("runs")?;
        let request = serde_json::to_string(&RunRequest::sync(agent_name, input))?;

        debug!("Running remote agent {} at {}", agent_name, url);

        let body = http::send_with_retry(&url, self.retry, || {
            self.agent
                .post(url.as_str())
                .header("Content-Type", "application/json")
                .send(&request)
                .and_then(|mut resp| resp.body_mut().read_to_string())
        })?;

        let response: RunResponse =
            serde_json::from_str(&body).context("Failed to parse ACP run response")?;

        if response.status != RunStatus::Completed {
            return Err(anyhow!(
                "Run {} of {} ended with status {:?}",
                response.run_id,
                agent_name,
                response.status
            ));
        }

        Ok(response.output_text())
    }

    #[inline]
    pub async fn ping(&self) -> Result<()> {
        let client = self.clone();
        http::run_blocking(move || client.ping_blocking()).await
    }

    #[inline]
    pub async fn list_agents(&self) -> Result<Vec<AgentManifest>> {
        let client = self.clone();
        http::run_blocking(move || client.list_agents_blocking()).await
    }

    #[inline]
    pub async fn run_sync(&self, agent_name: &str, input: &str) -> Result<String> {
        let client = self.clone();
        let agent_name = agent_name.to_string();
        let input = input.to_string();
        http::run_blocking(move || client.run_sync_blocking(&agent_name, &input)).await
    }
}
