use super::*;
use crate::http::RetryPolicy;
use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct Echo(&'static str);

#[async_trait]
impl Capability for Echo {
    fn name(&self) -> &str {
        self.0
    }

    fn description(&self) -> &str {
        "echoes its input"
    }

    async fn run(&self, input: &str) -> Result<String> {
        Ok(format!("{}: {input}", self.0))
    }
}

#[test]
fn names_are_sorted() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(Echo("policy_agent")));
    registry.register(Arc::new(Echo("doctor_agent")));
    registry.register(Arc::new(Echo("health_agent")));

    assert_eq!(
        registry.names(),
        vec!["doctor_agent", "health_agent", "policy_agent"]
    );
    assert_eq!(registry.manifests()[0].description, "echoes its input");
}

#[test]
fn duplicate_name_replaces_previous() {
    let mut registry = CapabilityRegistry::new();
    assert!(registry.register(Arc::new(Echo("a"))).is_none());
    assert!(registry.register(Arc::new(Echo("a"))).is_some());
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn get_returns_runnable_capability() {
    let mut registry = CapabilityRegistry::new();
    registry.register(Arc::new(Echo("a")));

    let capability = registry.get("a").expect("registered");
    assert_eq!(capability.run("hi").await.expect("runs"), "a: hi");
    assert!(registry.get("b").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn discover_registers_remote_agents_and_skips_dead_servers() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/agents"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "agents": [{"name": "policy_agent", "description": "Policy coverage"}]
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/runs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "run_id": "6b1f2a3e-1c54-4d8e-9a4e-0f0a8f5b1c2d",
            "agent_name": "policy_agent",
            "status": "completed",
            "output": [{"role": "agent", "parts": [{"content": "Covered."}]}]
        })))
        .mount(&server)
        .await;

    let live = AcpClient::new(&server.uri())
        .expect("valid url")
        .with_retry_policy(RetryPolicy::new(1));
    let dead = AcpClient::new("http://127.0.0.1:9")
        .expect("valid url")
        .with_retry_policy(RetryPolicy::new(1));

    let mut registry = CapabilityRegistry::new();
    let discovered = registry.discover(&[dead, live]).await;

    assert_eq!(discovered, 1);
    let remote = registry.get("policy_agent").expect("discovered");
    assert_eq!(remote.description(), "Policy coverage");
    assert_eq!(remote.run("Is physio covered?").await.expect("runs"), "Covered.");
}
