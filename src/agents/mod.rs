//! Agent Communication Protocol (ACP) agents.
//!
//! A [`Capability`] is anything that turns one text input into one text
//! output. Local agents implement it directly; agents hosted on another ACP
//! server are wrapped by [`RemoteCapability`]. The [`server`] module exposes a
//! [`CapabilityRegistry`] over HTTP and the [`dispatcher`] lets an LLM route a
//! query across the registry.

pub mod builtin;
pub mod client;
pub mod dispatcher;
pub mod protocol;
pub mod registry;
pub mod server;

use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::Result;

pub use builtin::{DoctorAgent, HealthAgent, PolicyAgent};
pub use client::AcpClient;
pub use dispatcher::{Decision, Dispatcher};
pub use protocol::{AgentManifest, Message, MessagePart, RunRequest, RunResponse, RunStatus};
pub use registry::{CapabilityRegistry, RemoteCapability};
pub use server::{router, serve};

/// First JSON value of type `T` embedded in free text. Parsing starts at
/// each `{` in turn and stops at the end of that value, so trailing prose or
/// further objects are ignored.
pub(crate) fn first_json_object<T: DeserializeOwned>(text: &str) -> Option<T> {
    text.match_indices('{').find_map(|(start, _)| {
        let rest = text.get(start..)?;
        serde_json::Deserializer::from_str(rest)
            .into_iter::<T>()
            .next()?
            .ok()
    })
}

/// Reply returned for runs whose first message carries no text
pub const NO_INPUT_REPLY: &str = "No input provided";

#[async_trait]
pub trait Capability: Send + Sync {
    /// Unique name used for routing
    fn name(&self) -> &str;

    /// One-line summary shown to callers and to the dispatcher LLM
    fn description(&self) -> &str;

    async fn run(&self, input: &str) -> Result<String>;

    #[inline]
    fn manifest(&self) -> AgentManifest {
        AgentManifest {
            name: self.name().to_string(),
            description: self.description().to_string(),
        }
    }
}
