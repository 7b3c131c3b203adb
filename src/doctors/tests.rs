use super::*;
use serde_json::{Value, json};
use std::time::Duration;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn directory_json() -> Value {
    json!({
        "1": {"name": "Dr. Alice Hart", "specialty": "Cardiology",
              "address": {"street": "1 Peach St", "city": "Atlanta", "state": "GA"}},
        "2": {"name": "Dr. Ben Stone", "specialty": "Orthopedics",
              "address": {"city": "Savannah", "state": "GA"}},
        "3": {"name": "Dr. Cara Lin", "specialty": "cardiology",
              "address": {"city": "Austin", "state": "TX"}},
        "4": {"name": "Dr. Dan Moss", "specialty": "Cardiology",
              "address": {"city": "Macon", "state": "ga"}}
    })
}

fn doctors() -> Vec<Doctor> {
    let payload: DirectoryPayload =
        serde_json::from_value(directory_json()).expect("directory parses");
    payload.into_doctors()
}

async fn directory_for(server: &MockServer) -> DoctorDirectory {
    let config = DoctorsConfig {
        source_url: format!("{}/doctors.json", server.uri()),
        max_results: 5,
        ..DoctorsConfig::default()
    };
    DoctorDirectory::new(&config)
        .with_retry_policy(RetryPolicy::new(1).with_initial_backoff(Duration::from_millis(1)))
}

#[test]
fn summary_format() {
    let doctor = Doctor {
        name: "Dr. Alice Hart".to_string(),
        specialty: "Cardiology".to_string(),
        address: Address {
            city: "Atlanta".to_string(),
            state: "GA".to_string(),
        },
    };
    assert_eq!(doctor.summary(), "Dr. Alice Hart (Cardiology) - Atlanta, GA");
}

#[test]
fn keyed_and_list_payloads_parse() {
    assert_eq!(doctors().len(), 4);

    let list: DirectoryPayload = serde_json::from_value(json!([
        {"name": "Dr. X", "specialty": "ENT", "address": {"city": "Reno", "state": "NV"}}
    ]))
    .expect("list parses");
    assert_eq!(list.into_doctors().len(), 1);
}

#[test]
fn keyed_payload_keeps_file_order() {
    let body = r#"{
        "9": {"name": "Dr. First", "specialty": "Cardiology", "address": {"city": "Atlanta", "state": "GA"}},
        "10": {"name": "Dr. Second", "specialty": "Cardiology", "address": {"city": "Macon", "state": "GA"}}
    }"#;
    let payload: DirectoryPayload = serde_json::from_str(body).expect("directory parses");
    let doctors = payload.into_doctors();

    let first = filter_doctors(&doctors, "GA", Some("Cardiology"), 1);
    assert_eq!(first.len(), 1);
    assert_eq!(first[0].name, "Dr. First");
}

#[tokio::test(flavor = "multi_thread")]
async fn lookup_caps_matches_in_file_order() {
    let server = MockServer::start().await;
    let body = r#"{
        "20": {"name": "Dr. Ann", "specialty": "ENT", "address": {"city": "Athens", "state": "GA"}},
        "3": {"name": "Dr. Bo", "specialty": "ENT", "address": {"city": "Albany", "state": "GA"}},
        "100": {"name": "Dr. Cy", "specialty": "ENT", "address": {"city": "Rome", "state": "GA"}}
    }"#;
    Mock::given(method("GET"))
        .and(path("/doctors.json"))
        .respond_with(ResponseTemplate::new(200).set_body_string(body))
        .mount(&server)
        .await;

    let config = DoctorsConfig {
        source_url: format!("{}/doctors.json", server.uri()),
        max_results: 2,
        ..DoctorsConfig::default()
    };
    let directory = DoctorDirectory::new(&config).with_retry_policy(RetryPolicy::new(1));

    assert_eq!(
        directory.lookup("GA", Some("ent")).await,
        "Here are some doctors:\nDr. Ann (ENT) - Athens, GA\nDr. Bo (ENT) - Albany, GA"
    );
}

#[test]
fn filter_by_state_ignores_case() {
    let doctors = doctors();

    let names: Vec<&str> = filter_doctors(&doctors, "Ga", None, 5)
        .iter()
        .map(|d| d.name.as_str())
        .collect();

    assert_eq!(names, vec!["Dr. Alice Hart", "Dr. Ben Stone", "Dr. Dan Moss"]);
}

#[test]
fn filter_by_specialty_ignores_case() {
    let doctors = doctors();

    let matches = filter_doctors(&doctors, "GA", Some("CARDIOLOGY"), 5);
    assert_eq!(matches.len(), 2);

    let matches = filter_doctors(&doctors, "TX", Some("Cardiology"), 5);
    assert_eq!(matches.len(), 1);
}

#[test]
fn blank_specialty_means_any() {
    let doctors = doctors();
    assert_eq!(filter_doctors(&doctors, "GA", Some("  "), 5).len(), 3);
}

#[test]
fn filter_respects_limit() {
    let doctors = doctors();
    assert_eq!(filter_doctors(&doctors, "GA", None, 2).len(), 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn list_doctors_wraps_matches_in_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doctors.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(directory_json()))
        .mount(&server)
        .await;

    let output = directory_for(&server)
        .await
        .list_doctors("GA", Some("Cardiology"))
        .await;

    let value: Value = serde_json::from_str(&output).expect("output is JSON");
    assert_eq!(
        value["message"],
        "Here are some doctors:\nDr. Alice Hart (Cardiology) - Atlanta, GA\nDr. Dan Moss (Cardiology) - Macon, ga"
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn no_matches_is_reported_as_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doctors.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(directory_json()))
        .mount(&server)
        .await;

    let message = directory_for(&server).await.lookup("WA", None).await;

    assert_eq!(message, "No doctors found in WA with specialty ''.");
}

#[tokio::test(flavor = "multi_thread")]
async fn fetch_failure_is_reported_as_message() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/doctors.json"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let message = directory_for(&server).await.lookup("GA", None).await;

    assert!(message.starts_with("Failed to fetch doctor data:"));
    assert!(message.contains("404"));
}
