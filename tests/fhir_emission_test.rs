//! Integration tests for emission to FHIR HTTP endpoints
//!
//! The downstream FHIR server is mocked with mockito; the router, the FHIR
//! transform and the HTTP deliverer run unchanged.

use medbridge::adapters::database::{MessageQuery, Store};
use medbridge::adapters::memory::InMemoryStore;
use medbridge::config::{parse_config, BridgeConfig};
use medbridge::domain::{
    Change, ChangeSet, Direction, EmissionOutcome, EmissionStatus, MessageKind, MutationContext,
    Patient, PatientIdentifier,
};
use medbridge::emission::EmissionRouter;
use mockito::Matcher;
use std::sync::Arc;

fn config(base_url: &str) -> BridgeConfig {
    parse_config(&format!(
        r#"
[application]
sending_application = "MEDBRIDGE"

[[endpoints]]
id = "fhir"
role = "sender"
timeout_seconds = 5
[endpoints.transport]
kind = "fhir_http"
base_url = "{base_url}"
"#
    ))
    .unwrap()
}

async fn commit_patient(store: &Arc<dyn Store>) -> Vec<medbridge::domain::DomainEvent> {
    let mut patient = Patient::new(PatientIdentifier::new("12345").unwrap(), "DOE");
    patient.given_name = Some("JOHN".to_string());
    patient.birth_date = Some("19800101".to_string());
    patient.sex = Some("M".to_string());

    let mut changes = ChangeSet::new(MutationContext::local());
    changes.push(Change::PutPatient {
        patient,
        expected_version: None,
    });
    store.commit(changes).await.unwrap()
}

#[tokio::test]
async fn test_patient_bundle_is_posted() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/fhir/$process-message")
        .match_header("content-type", "application/fhir+json")
        .match_body(Matcher::AllOf(vec![
            Matcher::Regex(r#""resourceType":"Bundle""#.to_string()),
            Matcher::Regex(r#""family":"DOE""#.to_string()),
            Matcher::Regex(r#""birthDate":"1980-01-01""#.to_string()),
        ]))
        .with_status(200)
        .with_body(r#"{"resourceType":"Bundle","type":"message"}"#)
        .expect(1)
        .create_async()
        .await;

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let config = config(&format!("{}/fhir", server.url()));
    let router = EmissionRouter::from_config(&config, store.clone()).unwrap();

    let events = commit_patient(&store).await;
    let outcomes = router
        .on_commit(&events, &MutationContext::local())
        .await
        .unwrap()
        .wait()
        .await;

    assert_eq!(outcomes.len(), 1);
    assert!(matches!(outcomes[0].1, EmissionOutcome::Sent { .. }));
    mock.assert_async().await;

    let records = store.list_emissions(None).await.unwrap();
    assert_eq!(records[0].status, EmissionStatus::Sent);
    assert!(records[0]
        .ack_payload
        .as_deref()
        .unwrap()
        .contains("\"type\":\"message\""));

    let outbound = store
        .list_messages(&MessageQuery {
            direction: Some(Direction::Outbound),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(outbound.len(), 1);
    assert_eq!(outbound[0].kind, MessageKind::Fhir);

    router.shutdown().await;
}

#[tokio::test]
async fn test_server_error_is_recorded() {
    let mut server = mockito::Server::new_async().await;
    let _mock = server
        .mock("POST", "/$process-message")
        .with_status(500)
        .with_body("boom")
        .create_async()
        .await;

    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let router = EmissionRouter::from_config(&config(&server.url()), store.clone()).unwrap();

    let events = commit_patient(&store).await;
    let report = router
        .on_commit(&events, &MutationContext::local())
        .await
        .unwrap();
    let outcomes = report.wait().await;
    match &outcomes[0].1 {
        EmissionOutcome::Failed {
            reason,
            ack_payload,
        } => {
            assert!(reason.contains("HTTP 500"), "reason: {reason}");
            assert_eq!(ack_payload.as_deref(), Some("boom"));
        }
        other => panic!("unexpected outcome {other:?}"),
    }

    let records = store.list_emissions(None).await.unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, EmissionStatus::Error);
    assert!(records[0].error.is_some());

    // A failed emission is final: the same commit is not dispatched again
    let again = router
        .on_commit(&events, &MutationContext::local())
        .await
        .unwrap();
    assert!(again.queued.is_empty());

    router.shutdown().await;
}
