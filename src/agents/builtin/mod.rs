// Agents hosted by `acp-agents serve`
// Each one reports its own failures as answer text

#[cfg(test)]
mod tests;

use async_trait::async_trait;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{debug, warn};

use super::{Capability, NO_INPUT_REPLY, first_json_object};
use crate::doctors::DoctorDirectory;
use crate::llm::CompletionProvider;
use crate::rag::QueryEngine;
use crate::{AgentError, Result};

pub const POLICY_AGENT: &str = "policy_agent";
pub const HEALTH_AGENT: &str = "health_agent";
pub const DOCTOR_AGENT: &str = "doctor_agent";

/// Answers coverage questions from the indexed policy document
pub struct PolicyAgent {
    engine: Arc<QueryEngine>,
}

impl PolicyAgent {
    #[inline]
    pub fn new(engine: Arc<QueryEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl Capability for PolicyAgent {
    fn name(&self) -> &str {
        POLICY_AGENT
    }

    fn description(&self) -> &str {
        "Answers questions about insurance policy coverage using the indexed policy document"
    }

    async fn run(&self, input: &str) -> Result<String> {
        if input.trim().is_empty() {
            return Ok(NO_INPUT_REPLY.to_string());
        }
        Ok(self.engine.answer(input).await)
    }
}

/// Passes general health questions straight to the LLM
pub struct HealthAgent {
    llm: Arc<dyn CompletionProvider>,
}

impl HealthAgent {
    #[inline]
    pub fn new(llm: Arc<dyn CompletionProvider>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Capability for HealthAgent {
    fn name(&self) -> &str {
        HEALTH_AGENT
    }

    fn description(&self) -> &str {
        "Answers general health and wellness questions"
    }

    async fn run(&self, input: &str) -> Result<String> {
        if input.trim().is_empty() {
            return Ok(NO_INPUT_REPLY.to_string());
        }

        match self.llm.complete(input).await {
            Ok(answer) => Ok(answer),
            Err(e) => {
                warn!("Health agent completion failed: {}", e);
                Ok(format!("Error processing your request: {e}"))
            }
        }
    }
}

/// Search criteria extracted from a free-text request
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SearchCriteria {
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub specialty: Option<String>,
}

/// Finds doctors by state and specialty in the doctor directory
pub struct DoctorAgent {
    llm: Arc<dyn CompletionProvider>,
    directory: Arc<DoctorDirectory>,
    default_state: String,
}

impl DoctorAgent {
    #[inline]
    pub fn new(
        llm: Arc<dyn CompletionProvider>,
        directory: Arc<DoctorDirectory>,
        default_state: impl Into<String>,
    ) -> Self {
        Self {
            llm,
            directory,
            default_state: default_state.into(),
        }
    }

    #[inline]
    pub fn extraction_prompt(&self, request: &str) -> String {
        format!(
            "Extract the US state and the medical specialty from the request below. \
             Reply with one JSON object and nothing else, for example \
             {{\"state\": \"GA\", \"specialty\": \"Cardiology\"}}. \
             Use the two-letter state code. If no state is mentioned use \"{}\". \
             If no specialty is mentioned use null.\n\nRequest: {}",
            self.default_state, request
        )
    }

    async fn extract_criteria(&self, request: &str) -> Result<SearchCriteria> {
        let reply = self.llm.complete(&self.extraction_prompt(request)).await?;

        first_json_object(&reply)
            .ok_or_else(|| AgentError::Agent(format!("no search criteria in reply: {reply}")))
    }

    async fn search(&self, request: &str) -> Result<String> {
        let criteria = self.extract_criteria(request).await?;

        let state = criteria
            .state
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(&self.default_state);
        let specialty = criteria.specialty.as_deref();

        debug!("Doctor search in {} for {:?}", state, specialty);
        Ok(self.directory.list_doctors(state, specialty).await)
    }
}

#[async_trait]
impl Capability for DoctorAgent {
    fn name(&self) -> &str {
        DOCTOR_AGENT
    }

    fn description(&self) -> &str {
        "Finds doctors near the user by US state and medical specialty"
    }

    async fn run(&self, input: &str) -> Result<String> {
        if input.trim().is_empty() {
            return Ok(NO_INPUT_REPLY.to_string());
        }

        match self.search(input).await {
            Ok(output) => Ok(output),
            Err(e) => {
                warn!("Doctor search failed: {}", e);
                Ok(format!(
                    "Doctor search failed. Please try again later. Error: {e}"
                ))
            }
        }
    }
}
