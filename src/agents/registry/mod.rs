#[cfg(test)]
mod tests;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::client::AcpClient;
use super::protocol::AgentManifest;
use super::Capability;
use crate::{AgentError, Result};

/// Named capabilities, iterated in name order
#[derive(Default, Clone)]
pub struct CapabilityRegistry {
    capabilities: BTreeMap<String, Arc<dyn Capability>>,
}

impl std::fmt::Debug for CapabilityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CapabilityRegistry")
            .field("names", &self.capabilities.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl CapabilityRegistry {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `capability`, returning the one it replaced under the same name
    #[inline]
    pub fn register(&mut self, capability: Arc<dyn Capability>) -> Option<Arc<dyn Capability>> {
        let name = capability.name().to_string();
        let previous = self.capabilities.insert(name.clone(), capability);
        if previous.is_some() {
            warn!("Capability {} registered twice, keeping the newest", name);
        }
        previous
    }

    #[inline]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.get(name).cloned()
    }

    #[inline]
    pub fn names(&self) -> Vec<&str> {
        self.capabilities.keys().map(String::as_str).collect()
    }

    #[inline]
    pub fn manifests(&self) -> Vec<AgentManifest> {
        self.capabilities.values().map(|c| c.manifest()).collect()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.capabilities.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.capabilities.is_empty()
    }

    /// Register every agent advertised by `clients`. Unreachable servers are
    /// skipped with a warning.
    #[inline]
    pub async fn discover(&mut self, clients: &[AcpClient]) -> usize {
        let mut discovered = 0;

        for client in clients {
            match client.list_agents().await {
                Ok(manifests) => {
                    info!(
                        "Discovered {} agents at {}",
                        manifests.len(),
                        client.base_url()
                    );
                    for manifest in manifests {
                        self.register(Arc::new(RemoteCapability::new(client.clone(), manifest)));
                        discovered += 1;
                    }
                }
                Err(e) => {
                    warn!("Skipping ACP server {}: {:#}", client.base_url(), e);
                }
            }
        }

        discovered
    }
}

/// An agent hosted on another ACP server
#[derive(Debug, Clone)]
pub struct RemoteCapability {
    client: AcpClient,
    manifest: AgentManifest,
}

impl RemoteCapability {
    #[inline]
    pub fn new(client: AcpClient, manifest: AgentManifest) -> Self {
        Self { client, manifest }
    }
}

#[async_trait]
impl Capability for RemoteCapability {
    fn name(&self) -> &str {
        &self.manifest.name
    }

    fn description(&self) -> &str {
        &self.manifest.description
    }

    async fn run(&self, input: &str) -> Result<String> {
        self.client
            .run_sync(&self.manifest.name, input)
            .await
            .map_err(|e| AgentError::Agent(format!("{}: {e:#}", self.manifest.name)))
    }
}
