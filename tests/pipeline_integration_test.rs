//! End-to-end tests of the bridge over loopback TCP
//!
//! A real listener receives messages from a test client, commits them to the
//! in-memory store and emits to a downstream MLLP peer that acknowledges
//! every frame.

use futures::{SinkExt, StreamExt};
use medbridge::adapters::database::Store;
use medbridge::adapters::memory::InMemoryStore;
use medbridge::config::{parse_config, BridgeConfig};
use medbridge::core::ingest::InboundProcessor;
use medbridge::core::server::{MllpServer, ServerSummary};
use medbridge::domain::{
    EmissionRecord, EmissionStatus, EncounterIdentifier, MessageFate, PatientIdentifier,
};
use medbridge::emission::EmissionRouter;
use medbridge::hl7::Message;
use medbridge::transport::{AckBuilder, AckReply, MllpCodec};
use medbridge::workflow::EncounterState;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::codec::Framed;

const ADMIT: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20240101120000||ADT^A01^ADT_A01|MSG1|P|2.5\r\
EVN|A01|20240101120000\r\
PID|||12345^^^HOSP^PI||DOE^JOHN^^^^^L||19800101|M\r\
PV1||I|CARDIO^101^A||||||||||||||||V0001\r\
ZBE|MOV1^HOSP|20240101120000||INSERT|N||CARDIO^^^^^^UF^^^CARDIO||M\r";

/// Downstream peer acknowledging every frame with AA
async fn ack_server() -> (u16, Arc<Mutex<Vec<String>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let received = Arc::new(Mutex::new(Vec::new()));
    let log = received.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let log = log.clone();
            tokio::spawn(async move {
                let mut framed = Framed::new(stream, MllpCodec::new());
                while let Some(Ok(Ok(text))) = framed.next().await {
                    let header = Message::parse(&text).unwrap().header();
                    log.lock().unwrap().push(text);
                    let ack = AckBuilder::new("RIS", "HOSP").accept(&header);
                    if framed.send(ack).await.is_err() {
                        break;
                    }
                }
            });
        }
    });
    (port, received)
}

fn config(peer_port: u16) -> BridgeConfig {
    parse_config(&format!(
        r#"
[application]
sending_application = "MEDBRIDGE"
sending_facility = "HOSP"

[listener]
bind_address = "127.0.0.1"
port = 0

[emission]
max_concurrency = 2
delivery_timeout_seconds = 5

[[endpoints]]
id = "his"
name = "HIS"
role = "receiver"
validation_profile = "pam"
validation_mode = "reject"
[endpoints.transport]
kind = "mllp"
host = "127.0.0.1"
port = 2575

[[endpoints]]
id = "ris"
role = "sender"
[endpoints.transport]
kind = "mllp"
host = "127.0.0.1"
port = {peer_port}
"#
    ))
    .unwrap()
}

struct Bridge {
    addr: SocketAddr,
    store: Arc<dyn Store>,
    shutdown: watch::Sender<bool>,
    server: JoinHandle<medbridge::domain::Result<ServerSummary>>,
}

async fn start(config: &BridgeConfig) -> Bridge {
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let router = Arc::new(EmissionRouter::from_config(config, store.clone()).unwrap());
    let processor = Arc::new(InboundProcessor::new(config, store.clone(), router));
    let server = MllpServer::bind(&config.listener, processor).await.unwrap();
    let addr = server.local_addr().unwrap();
    let (shutdown, rx) = watch::channel(false);
    let server = tokio::spawn(server.run(rx));
    Bridge {
        addr,
        store,
        shutdown,
        server,
    }
}

async fn send(addr: SocketAddr, text: &str) -> AckReply {
    let stream = TcpStream::connect(addr).await.unwrap();
    let mut framed = Framed::new(stream, MllpCodec::new());
    framed.send(text.to_string()).await.unwrap();
    let ack = framed.next().await.unwrap().unwrap().unwrap();
    AckReply::parse(&ack).unwrap()
}

/// Waits until no emission record is left in the generated state
async fn settled(store: &Arc<dyn Store>) -> Vec<EmissionRecord> {
    for _ in 0..100 {
        let records = store.list_emissions(None).await.unwrap();
        if records.iter().all(|r| r.status != EmissionStatus::Generated) {
            return records;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("emissions did not settle");
}

#[tokio::test]
async fn test_admission_is_committed_and_emitted() {
    let (peer_port, received) = ack_server().await;
    let bridge = start(&config(peer_port)).await;

    let reply = send(bridge.addr, ADMIT).await;
    assert!(reply.is_accepted());

    let encounter = bridge
        .store
        .find_encounter(&EncounterIdentifier::new("V0001").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(encounter.current_state, EncounterState::Admitted);

    // One emission for the sender: the admission itself carries the new patient
    let records = settled(&bridge.store).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, EmissionStatus::Sent);
    assert_eq!(records[0].key.endpoint_id.as_str(), "ris");
    assert_eq!(records[0].trigger.as_deref(), Some("A01"));
    assert!(records[0].ack_payload.is_some());

    let emitted = received.lock().unwrap().clone();
    assert_eq!(emitted.len(), 1);
    assert!(emitted[0].starts_with("MSH|^~\\&|MEDBRIDGE|HOSP|"));
    assert!(emitted[0].contains("|ADT^A01^ADT_A01|"));

    bridge.shutdown.send(true).unwrap();
    let summary = bridge.server.await.unwrap().unwrap();
    assert_eq!(summary.messages, 1);
}

#[tokio::test]
async fn test_rejected_message_is_not_emitted() {
    let (peer_port, received) = ack_server().await;
    let bridge = start(&config(peer_port)).await;

    let reply = send(bridge.addr, &ADMIT.replace("12345^^^HOSP^PI", "")).await;
    assert!(!reply.is_accepted());
    assert!(reply.reason().contains("PID3_EMPTY"));

    assert!(bridge
        .store
        .find_encounter(&EncounterIdentifier::new("V0001").unwrap())
        .await
        .unwrap()
        .is_none());
    assert!(bridge.store.list_emissions(None).await.unwrap().is_empty());
    assert!(received.lock().unwrap().is_empty());

    let _ = bridge.shutdown.send(true);
}

#[tokio::test]
async fn test_repeated_message_emits_once_per_change() {
    let (peer_port, received) = ack_server().await;
    let bridge = start(&config(peer_port)).await;

    assert!(send(bridge.addr, ADMIT).await.is_accepted());
    settled(&bridge.store).await;

    // Demographic update: one new patient version, one new emission
    let update = ADMIT
        .replace("ADT^A01^ADT_A01|MSG1", "ADT^A31^ADT_A05|MSG2")
        .replace("EVN|A01", "EVN|A31")
        .replace("DOE^JOHN", "DOE^JACK");
    let update: String = update
        .split('\r')
        .filter(|s| !s.starts_with("ZBE") && !s.starts_with("PV1"))
        .map(|s| format!("{s}\r"))
        .collect();
    assert!(send(bridge.addr, &update).await.is_accepted());

    let records = settled(&bridge.store).await;
    assert_eq!(records.len(), 2);
    let keys: std::collections::HashSet<_> = records.iter().map(|r| r.key.clone()).collect();
    assert_eq!(keys.len(), 2);
    assert_eq!(received.lock().unwrap().len(), 2);

    let patient = bridge
        .store
        .find_patient(&PatientIdentifier::new("12345").unwrap())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(patient.given_name.as_deref(), Some("JACK"));

    let _ = bridge.shutdown.send(true);
}

#[tokio::test]
async fn test_echo_of_own_emission_is_not_re_emitted() {
    let (peer_port, received) = ack_server().await;
    let config = config(peer_port);
    let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
    let router = Arc::new(EmissionRouter::from_config(&config, store.clone()).unwrap());
    let processor = InboundProcessor::new(&config, store.clone(), router);

    let echo = ADMIT.replace("MSH|^~\\&|HIS|HOSP|", "MSH|^~\\&|MEDBRIDGE|HOSP|");
    let outcome = processor.process(&echo).await;

    assert_eq!(outcome.fate, MessageFate::Processed);
    assert!(!outcome.events.is_empty());
    let dispatch = outcome.dispatch.expect("dispatch report");
    assert!(dispatch.suppressed);
    assert!(dispatch.queued.is_empty());
    assert!(store.list_emissions(None).await.unwrap().is_empty());
    assert!(received.lock().unwrap().is_empty());
}
