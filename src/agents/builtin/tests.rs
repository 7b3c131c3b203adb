use super::*;
use crate::config::{DoctorsConfig, RetrievalConfig};
use crate::http::RetryPolicy;
use crate::index::VectorIndex;
use crate::test_support::{StubCompleter, StubEmbedder, chunk};
use serde_json::{Value, json};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn directory_server() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doctors.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "a": {"name": "Dr. Alice Hart", "specialty": "Cardiology",
                  "address": {"city": "Atlanta", "state": "GA"}},
            "b": {"name": "Dr. Ben Stone", "specialty": "Orthopedics",
                  "address": {"city": "Savannah", "state": "GA"}},
            "c": {"name": "Dr. Cara Lin", "specialty": "Cardiology",
                  "address": {"city": "Austin", "state": "TX"}}
        })))
        .mount(&server)
        .await;
    server
}

fn doctor_agent(server: &MockServer, llm: Arc<StubCompleter>) -> DoctorAgent {
    let config = DoctorsConfig {
        source_url: format!("{}/doctors.json", server.uri()),
        ..DoctorsConfig::default()
    };
    let directory = DoctorDirectory::new(&config).with_retry_policy(RetryPolicy::new(1));
    DoctorAgent::new(llm, Arc::new(directory), "GA")
}

fn message_of(output: &str) -> String {
    let value: Value = serde_json::from_str(output).expect("output is JSON");
    value["message"].as_str().expect("message text").to_string()
}

#[tokio::test]
async fn health_agent_passes_input_through() {
    let llm = Arc::new(StubCompleter::answering("Sleep eight hours."));
    let agent = HealthAgent::new(Arc::clone(&llm) as Arc<dyn CompletionProvider>);

    let answer = agent.run("How much sleep?").await.expect("runs");

    assert_eq!(answer, "Sleep eight hours.");
    assert_eq!(llm.prompts(), vec!["How much sleep?"]);
}

#[tokio::test]
async fn health_agent_reports_failure_as_text() {
    let agent = HealthAgent::new(Arc::new(StubCompleter::failing("bad key")));

    let answer = agent.run("hi").await.expect("runs");

    assert!(answer.starts_with("Error processing your request:"));
    assert!(answer.contains("bad key"));
}

#[tokio::test]
async fn empty_input_is_answered_without_llm() {
    let llm = Arc::new(StubCompleter::answering("unused"));
    let agent = HealthAgent::new(Arc::clone(&llm) as Arc<dyn CompletionProvider>);

    assert_eq!(agent.run("  ").await.expect("runs"), NO_INPUT_REPLY);
    assert!(llm.prompts().is_empty());
}

#[tokio::test]
async fn policy_agent_answers_from_engine() {
    let embedder = Arc::new(StubEmbedder::new(8));
    let text = "Physiotherapy is covered for 20 sessions.";
    let index = VectorIndex::from_parts("stub-embed", vec![chunk(0, 0, text)], vec![
        embedder.vector_for(text),
    ])
    .expect("valid parts");
    let llm = Arc::new(StubCompleter::answering("Yes, 20 sessions."));
    let engine = QueryEngine::new(
        Arc::new(index),
        embedder,
        Arc::clone(&llm) as Arc<dyn CompletionProvider>,
        &RetrievalConfig::default(),
    )
    .expect("engine builds");

    let agent = PolicyAgent::new(Arc::new(engine));

    assert_eq!(agent.name(), POLICY_AGENT);
    assert_eq!(
        agent.run("Is physio covered?").await.expect("runs"),
        "Yes, 20 sessions."
    );
    assert!(llm.prompts()[0].contains(text));
}

#[tokio::test(flavor = "multi_thread")]
async fn doctor_agent_searches_extracted_criteria() {
    let server = directory_server().await;
    let llm = Arc::new(StubCompleter::answering(
        r#"{"state": "GA", "specialty": "cardiology"}"#,
    ));
    let agent = doctor_agent(&server, Arc::clone(&llm));

    let output = agent
        .run("I'm based in Atlanta,GA. Are there any Cardiologists near me?")
        .await
        .expect("runs");

    assert_eq!(
        message_of(&output),
        "Here are some doctors:\nDr. Alice Hart (Cardiology) - Atlanta, GA"
    );
    assert!(llm.prompts()[0].contains("Atlanta,GA"));
}

#[tokio::test(flavor = "multi_thread")]
async fn doctor_agent_defaults_state() {
    let server = directory_server().await;
    let llm = Arc::new(StubCompleter::answering(
        "```json\n{\"state\": null, \"specialty\": \"Orthopedics\"}\n```",
    ));
    let agent = doctor_agent(&server, llm);

    let output = agent.run("I need a bone doctor").await.expect("runs");

    assert_eq!(
        message_of(&output),
        "Here are some doctors:\nDr. Ben Stone (Orthopedics) - Savannah, GA"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn doctor_agent_uses_first_criteria_object() {
    let server = directory_server().await;
    let llm = Arc::new(StubCompleter::answering(
        "{\"state\": \"GA\", \"specialty\": \"Cardiology\"}\n\
         Alternative: {\"state\": \"TX\", \"specialty\": null}",
    ));
    let agent = doctor_agent(&server, llm);

    let output = agent.run("Cardiologists in Atlanta").await.expect("runs");

    assert_eq!(
        message_of(&output),
        "Here are some doctors:\nDr. Alice Hart (Cardiology) - Atlanta, GA"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn doctor_agent_reports_unusable_extraction() {
    let server = directory_server().await;
    let agent = doctor_agent(&server, Arc::new(StubCompleter::answering("no idea")));

    let output = agent.run("find me someone").await.expect("runs");

    assert!(output.starts_with("Doctor search failed. Please try again later. Error:"));
}

#[tokio::test(flavor = "multi_thread")]
async fn doctor_agent_reports_llm_failure() {
    let server = directory_server().await;
    let agent = doctor_agent(&server, Arc::new(StubCompleter::failing("timeout")));

    let output = agent.run("Cardiologists in GA").await.expect("runs");

    assert!(output.starts_with("Doctor search failed."));
    assert!(output.contains("timeout"));
}
