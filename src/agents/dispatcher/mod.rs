//! LLM-driven routing across a [`CapabilityRegistry`].
//!
//! Each step the model sees the available agents plus every call made so far
//! and replies with one JSON decision: call an agent, or give the final
//! answer. Calls to unknown agents and agent failures are reported back to
//! the model as observations so it can recover.


use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::first_json_object;
use super::registry::CapabilityRegistry;
use crate::llm::CompletionProvider;
use crate::{AgentError, Result};

pub const DEFAULT_MAX_STEPS: usize = 5;

pub const DISPATCHER_TEMPERATURE: f32 = 0.3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum Decision {
    Call { agent: String, input: String },
    Final { answer: String },
}

impl Decision {
    /// Parse the first decision object in `reply`. A reply with no parseable
    /// decision is taken as the final answer verbatim.
    #[inline]
    pub fn parse(reply: &str) -> Self {
        first_json_object(reply).unwrap_or_else(|| Self::Final {
            answer: reply.trim().to_string(),
        })
    }
}

/// One completed agent call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub agent: String,
    pub input: String,
    pub observation: String,
}

pub struct Dispatcher {
    registry: Arc<CapabilityRegistry>,
    llm: Arc<dyn CompletionProvider>,
    max_steps: usize,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry)
            .field("max_steps", &self.max_steps)
            .finish_non_exhaustive()
    }
}

impl Dispatcher {
    #[inline]
    pub fn new(registry: Arc<CapabilityRegistry>, llm: Arc<dyn CompletionProvider>) -> Self {
        Self {
            registry,
            llm,
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    #[inline]
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.max_steps = max_steps.max(1);
        self
    }

    #[inline]
    pub fn render_prompt(&self, query: &str, steps: &[Step]) -> String {
        let mut prompt = String::from(
            "You are a router that answers the user's query by delegating to \
             specialised agents.\n\nAvailable agents:\n",
        );

        if self.registry.is_empty() {
            prompt.push_str("(none)\n");
        }
        for manifest in self.registry.manifests() {
            let _ = writeln!(prompt, "- {}: {}", manifest.name, manifest.description);
        }

        prompt.push_str(
            "\nReply with exactly one JSON object and nothing else. To call an agent:\n\
             {\"action\": \"call\", \"agent\": \"<agent name>\", \"input\": \"<text for the agent>\"}\n\
             When you can answer the query:\n\
             {\"action\": \"final\", \"answer\": \"<answer for the user>\"}\n",
        );

        if !steps.is_empty() {
            prompt.push_str("\nCalls made so far:\n");
            for (i, step) in steps.iter().enumerate() {
                let _ = writeln!(
                    prompt,
                    "{}. {} <- {}\n   Observation: {}",
                    i + 1,
                    step.agent,
                    step.input,
                    step.observation
                );
            }
        }

        let _ = write!(prompt, "\nQuery: {query}\n");
        prompt
    }

    async fn call(&self, agent: &str, input: &str) -> String {
        let Some(capability) = self.registry.get(agent) else {
            warn!("Dispatcher asked for unknown agent {}", agent);
            return format!(
                "Unknown agent '{}'. Available agents: {}",
                agent,
                self.registry.names().join(", ")
            );
        };

        match capability.run(input).await {
            Ok(output) => output,
            Err(e) => {
                warn!("Agent {} failed during dispatch: {}", agent, e);
                format!("Agent '{agent}' failed: {e}")
            }
        }
    }

    /// Route `query` until the model gives a final answer
    #[inline]
    pub async fn run(&self, query: &str) -> Result<String> {
        let mut steps: Vec<Step> = Vec::new();

        for step in 1..=self.max_steps {
            let prompt = self.render_prompt(query, &steps);
            let reply = self.llm.complete(&prompt).await?;

            match Decision::parse(&reply) {
                Decision::Final { answer } => {
                    info!("Dispatcher answered after {} agent calls", steps.len());
                    return Ok(answer);
                }
                Decision::Call { agent, input } => {
                    debug!("Dispatch step {}: calling {}", step, agent);
                    let observation = self.call(&agent, &input).await;
                    steps.push(Step {
                        agent,
                        input,
                        observation,
                    });
                }
            }
        }

        Err(AgentError::Agent(format!(
            "no final answer after {} steps",
            self.max_steps
        )))
    }

    /// Like [`run`](Self::run), reporting failures as answer text
    #[inline]
    pub async fn run_to_text(&self, query: &str) -> String {
        match self.run(query).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!("Dispatch failed: {}", e);
                format!("Error processing request: {e}")
            }
        }
    }
}
