//! Emission router
//!
//! The router runs after a change set has committed. For every domain event it
//! resolves the outbound trigger, claims one emission key per target endpoint
//! and hands the payload, built from the snapshot the commit returned, to that
//! endpoint's delivery lane. A patient written in the same commit as one of its
//! movements is not emitted on its own to endpoints that receive the movement.
//!
//! Each endpoint has one FIFO lane served by one worker, so deliveries to the
//! same endpoint keep commit order. A semaphore shared by all workers bounds
//! the number of deliveries in flight. Lanes are bounded queues; dispatching
//! into a full lane waits instead of spawning more work.

use crate::adapters::database::Store;
use crate::config::schema::{BridgeConfig, EmissionConfig};
use crate::domain::emission::{EmissionKey, EmissionOutcome, EmissionRecord};
use crate::domain::endpoint::Endpoint;
use crate::domain::errors::DeliveryError;
use crate::domain::events::{DomainEntity, DomainEvent, EntityKind, MutationContext, Operation};
use crate::domain::message::RawMessage;
use crate::domain::Result;
use crate::emission::delivery::{deliverer_for, Deliverer};
use crate::emission::payload::{transform_for, OutboundPayload, PayloadTransform};
use crate::emission::triggers::{is_emitted, outbound_trigger};
use crate::hl7::TriggerEvent;
use crate::log_emission_outcome;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::JoinHandle;

/// One delivery waiting in a lane
struct Job {
    key: EmissionKey,
    payload: OutboundPayload,
    done: oneshot::Sender<EmissionOutcome>,
}

/// Dispatch side of one endpoint
struct Lane {
    endpoint: Arc<Endpoint>,
    transform: Box<dyn PayloadTransform>,
    sender: mpsc::Sender<Job>,
}

/// An emission handed to a lane
#[derive(Debug)]
pub struct QueuedEmission {
    pub key: EmissionKey,
    pub trigger: TriggerEvent,
    outcome: oneshot::Receiver<EmissionOutcome>,
}

/// What `on_commit` did with a batch of events
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// The mutation echoed an emission; nothing was dispatched
    pub suppressed: bool,
    pub queued: Vec<QueuedEmission>,
    /// Keys already claimed by an earlier dispatch
    pub skipped: Vec<EmissionKey>,
}

impl DispatchReport {
    fn suppressed() -> Self {
        Self {
            suppressed: true,
            ..Self::default()
        }
    }

    pub fn queued_keys(&self) -> Vec<&EmissionKey> {
        self.queued.iter().map(|q| &q.key).collect()
    }

    /// Waits for every queued emission to reach its final outcome
    pub async fn wait(self) -> Vec<(EmissionKey, EmissionOutcome)> {
        let mut outcomes = Vec::with_capacity(self.queued.len());
        for queued in self.queued {
            let outcome = queued.outcome.await.unwrap_or_else(|_| EmissionOutcome::Failed {
                reason: "router shut down".to_string(),
                ack_payload: None,
            });
            outcomes.push((queued.key, outcome));
        }
        outcomes
    }
}

/// Post-commit emission router
pub struct EmissionRouter {
    store: Arc<dyn Store>,
    lanes: Vec<Lane>,
    workers: Vec<JoinHandle<()>>,
}

/// Builder for [`EmissionRouter`]
pub struct EmissionRouterBuilder {
    store: Arc<dyn Store>,
    settings: EmissionConfig,
    sending_application: String,
    sending_facility: String,
    endpoints: Vec<(Endpoint, Option<Arc<dyn Deliverer>>)>,
}

impl EmissionRouterBuilder {
    pub fn settings(mut self, settings: EmissionConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Identity written into MSH-3/MSH-4 of emitted messages
    pub fn sender(mut self, application: impl Into<String>, facility: impl Into<String>) -> Self {
        self.sending_application = application.into();
        self.sending_facility = facility.into();
        self
    }

    /// Adds a target using the deliverer matching its transport
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoints.push((endpoint, None));
        self
    }

    /// Adds a target with an explicit deliverer
    pub fn endpoint_with(mut self, endpoint: Endpoint, deliverer: Arc<dyn Deliverer>) -> Self {
        self.endpoints.push((endpoint, Some(deliverer)));
        self
    }

    /// Spawns one worker per emitting endpoint. Must run inside a Tokio
    /// runtime.
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Delivery` when a transport cannot be set up.
    pub fn build(self) -> Result<EmissionRouter> {
        let permits = Arc::new(Semaphore::new(self.settings.max_concurrency.max(1)));
        let mut lanes = Vec::new();
        let mut workers = Vec::new();

        for (endpoint, deliverer) in self.endpoints {
            if !endpoint.enabled || !endpoint.role.emits() {
                tracing::debug!(endpoint_id = %endpoint.id, "Endpoint does not receive emissions");
                continue;
            }
            let timeout = Duration::from_secs(
                endpoint
                    .timeout_seconds
                    .unwrap_or(self.settings.delivery_timeout_seconds),
            );
            let deliverer = match deliverer {
                Some(deliverer) => deliverer,
                None => deliverer_for(&endpoint, timeout)?,
            };
            let transform =
                transform_for(&endpoint, &self.sending_application, &self.sending_facility);
            let (sender, receiver) = mpsc::channel(self.settings.queue_capacity.max(1));
            let endpoint = Arc::new(endpoint);

            let worker = Worker {
                endpoint: endpoint.clone(),
                deliverer,
                store: self.store.clone(),
                permits: permits.clone(),
                timeout,
            };
            workers.push(tokio::spawn(worker.run(receiver)));

            tracing::info!(
                endpoint_id = %endpoint.id,
                peer = %endpoint.peer(),
                kind = transform.kind().as_str(),
                "Emission lane started"
            );
            lanes.push(Lane {
                endpoint,
                transform,
                sender,
            });
        }

        Ok(EmissionRouter {
            store: self.store,
            lanes,
            workers,
        })
    }
}

impl EmissionRouter {
    pub fn builder(store: Arc<dyn Store>) -> EmissionRouterBuilder {
        EmissionRouterBuilder {
            store,
            settings: EmissionConfig::default(),
            sending_application: "MEDBRIDGE".to_string(),
            sending_facility: "MEDBRIDGE".to_string(),
            endpoints: Vec::new(),
        }
    }

    /// Router for every emitting endpoint of the configuration
    pub fn from_config(config: &BridgeConfig, store: Arc<dyn Store>) -> Result<Self> {
        config
            .emission_targets()
            .fold(
                Self::builder(store)
                    .settings(config.emission.clone())
                    .sender(
                        config.application.sending_application.clone(),
                        config.application.sending_facility.clone(),
                    ),
                |builder, endpoint| builder.endpoint(endpoint.clone()),
            )
            .build()
    }

    /// Endpoints with a running lane
    pub fn targets(&self) -> impl Iterator<Item = &Endpoint> {
        self.lanes.iter().map(|lane| lane.endpoint.as_ref())
    }

    /// Dispatches the events of one committed change set.
    ///
    /// Must be called once per commit, after the commit. Returns as soon as
    /// every emission is claimed and queued; delivery happens in the
    /// background.
    ///
    /// # Errors
    ///
    /// Returns an error when the store cannot claim or complete a key.
    pub async fn on_commit(
        &self,
        events: &[DomainEvent],
        context: &MutationContext,
    ) -> Result<DispatchReport> {
        if context.suppresses_emission() {
            tracing::debug!(
                events = events.len(),
                correlation_id = context.correlation_id.as_deref().unwrap_or(""),
                "Mutation echoes an emission, not dispatching"
            );
            return Ok(DispatchReport::suppressed());
        }

        let mut report = DispatchReport::default();
        for event in events {
            if !is_emitted(event.kind, event.operation) {
                continue;
            }
            let targets: Vec<&Lane> = self
                .lanes
                .iter()
                .filter(|lane| lane.endpoint.accepts(event.kind))
                .filter(|lane| !carried_by_movement(event, events, &lane.endpoint))
                .collect();
            if targets.is_empty() {
                continue;
            }

            let entity = &event.entity;
            let Some(trigger) = outbound_trigger(entity, event.operation) else {
                continue;
            };

            for lane in targets {
                let key = EmissionKey {
                    entity_id: event.entity_id,
                    version: event.version,
                    endpoint_id: lane.endpoint.id.clone(),
                };
                let record = EmissionRecord::generated(
                    key.clone(),
                    event.kind,
                    Some(trigger.code().to_string()),
                );
                if !self.store.claim_emission(&record).await? {
                    tracing::debug!(emission = %key, "Emission already claimed, skipping");
                    report.skipped.push(key);
                    continue;
                }

                let (done, outcome) = oneshot::channel();
                match lane.transform.to_payload(entity, &trigger, &lane.endpoint) {
                    Ok(payload) => {
                        let job = Job {
                            key: key.clone(),
                            payload,
                            done,
                        };
                        if let Err(mpsc::error::SendError(job)) = lane.sender.send(job).await {
                            self.fail(job.key, &trigger, "router shut down".to_string(), job.done)
                                .await?;
                        }
                    }
                    Err(err) => {
                        self.fail(key.clone(), &trigger, err.to_string(), done).await?;
                    }
                }
                report.queued.push(QueuedEmission {
                    key,
                    trigger: trigger.clone(),
                    outcome,
                });
            }
        }
        Ok(report)
    }

    /// Completes a claimed emission that never reached a lane
    async fn fail(
        &self,
        key: EmissionKey,
        trigger: &TriggerEvent,
        reason: String,
        done: oneshot::Sender<EmissionOutcome>,
    ) -> Result<()> {
        let outcome = EmissionOutcome::Failed {
            reason,
            ack_payload: None,
        };
        self.store.complete_emission(&key, &outcome).await?;
        log_emission_outcome!(&key, trigger, &outcome);
        let _ = done.send(outcome);
        Ok(())
    }

    /// Closes every lane and waits for queued deliveries to finish
    pub async fn shutdown(self) {
        drop(self.lanes);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "Emission worker panicked");
            }
        }
        tracing::info!("Emission router stopped");
    }
}

/// True when the same commit appends a movement of this patient that the
/// endpoint receives: the movement's message already carries PID.
fn carried_by_movement(event: &DomainEvent, events: &[DomainEvent], endpoint: &Endpoint) -> bool {
    let DomainEntity::Patient(patient) = &event.entity else {
        return false;
    };
    endpoint.accepts(EntityKind::Movement)
        && events.iter().any(|other| {
            other.operation == Operation::Insert
                && matches!(&other.entity, DomainEntity::Movement { patient: p, .. } if p.id == patient.id)
        })
}

/// Serves one lane
struct Worker {
    endpoint: Arc<Endpoint>,
    deliverer: Arc<dyn Deliverer>,
    store: Arc<dyn Store>,
    permits: Arc<Semaphore>,
    timeout: Duration,
}

impl Worker {
    async fn run(self, mut jobs: mpsc::Receiver<Job>) {
        while let Some(job) = jobs.recv().await {
            let outcome = self.deliver(&job).await;

            if let Err(e) = self.store.complete_emission(&job.key, &outcome).await {
                tracing::error!(emission = %job.key, error = %e, "Failed to record emission outcome");
            }
            log_emission_outcome!(&job.key, &job.payload.trigger, &outcome);
            let _ = job.done.send(outcome);
        }
        tracing::debug!(endpoint_id = %self.endpoint.id, "Emission lane closed");
    }

    async fn deliver(&self, job: &Job) -> EmissionOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            return EmissionOutcome::Failed {
                reason: "router shut down".to_string(),
                ack_payload: None,
            };
        };

        let outbound = RawMessage::outbound(
            job.payload.kind,
            job.payload.body.clone(),
            self.endpoint.id.clone(),
        )
        .with_header(
            Some(job.payload.control_id.clone()),
            Some(job.payload.trigger.code().to_string()),
        );
        if let Err(e) = self.store.record_message(&outbound).await {
            tracing::warn!(emission = %job.key, error = %e, "Failed to record outbound message");
        }

        match tokio::time::timeout(self.timeout, self.deliverer.deliver(&job.payload)).await {
            Err(_) => EmissionOutcome::Failed {
                reason: DeliveryError::Timeout(self.timeout.as_secs()).to_string(),
                ack_payload: None,
            },
            Ok(Err(err)) => EmissionOutcome::Failed {
                reason: err.to_string(),
                ack_payload: None,
            },
            Ok(Ok(response)) if response.accepted => EmissionOutcome::Sent {
                ack_payload: Some(response.body),
            },
            Ok(Ok(response)) => EmissionOutcome::Failed {
                reason: DeliveryError::Rejected(response.reason.unwrap_or_default()).to_string(),
                ack_payload: Some(response.body),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::InMemoryStore;
    use crate::domain::emission::EmissionStatus;
    use crate::domain::endpoint::{EndpointRole, EndpointTransport, ValidationMode};
    use crate::adapters::database::MessageQuery;
    use crate::domain::encounter::{Encounter, Movement};
    use crate::domain::events::{Change, ChangeSet};
    use crate::domain::ids::{EncounterIdentifier, EndpointId, PatientIdentifier};
    use crate::domain::patient::Patient;
    use crate::emission::delivery::DeliveryResponse;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Recording {
        calls: AtomicUsize,
        accept: bool,
        delay: Duration,
    }

    impl Recording {
        fn new(accept: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                accept,
                delay: Duration::ZERO,
            })
        }
    }

    #[async_trait]
    impl Deliverer for Recording {
        async fn deliver(
            &self,
            payload: &OutboundPayload,
        ) -> std::result::Result<DeliveryResponse, DeliveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(DeliveryResponse {
                body: format!("MSA|AA|{}", payload.control_id),
                accepted: self.accept,
                reason: (!self.accept).then(|| "AE".to_string()),
            })
        }
    }

    fn endpoint(id: &str, scope: Vec<EntityKind>) -> Endpoint {
        Endpoint {
            id: EndpointId::new(id).unwrap(),
            name: String::new(),
            role: EndpointRole::Sender,
            enabled: true,
            transport: EndpointTransport::Mllp {
                host: "127.0.0.1".to_string(),
                port: 1,
            },
            validation_profile: "base".to_string(),
            validation_mode: ValidationMode::Warn,
            scope,
            loopback: false,
            timeout_seconds: Some(1),
        }
    }

    async fn committed_patient(store: &Arc<dyn Store>) -> Vec<DomainEvent> {
        let mut set = ChangeSet::new(MutationContext::local());
        set.push(Change::PutPatient {
            patient: Patient::new(PatientIdentifier::new("12345").unwrap(), "DOE"),
            expected_version: None,
        });
        store.commit(set).await.unwrap()
    }

    async fn committed_admission(store: &Arc<dyn Store>) -> Vec<DomainEvent> {
        let patient = Patient::new(PatientIdentifier::new("12345").unwrap(), "DOE");
        let mut encounter = Encounter::new(
            EncounterIdentifier::new("V001").unwrap(),
            patient.id,
            patient.identifier.clone(),
        );
        let movement = encounter
            .append_movement(Movement::builder().trigger(TriggerEvent::A01).build().unwrap())
            .unwrap();

        let mut set = ChangeSet::new(MutationContext::local());
        set.push(Change::PutPatient {
            patient,
            expected_version: None,
        });
        set.push(Change::PutEncounter {
            encounter,
            expected_version: None,
        });
        set.push(Change::InsertMovement { movement });
        store.commit(set).await.unwrap()
    }

    #[tokio::test]
    async fn test_dispatch_is_idempotent_per_key() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let deliverer = Recording::new(true);
        let router = EmissionRouter::builder(store.clone())
            .endpoint_with(endpoint("ris", Vec::new()), deliverer.clone())
            .build()
            .unwrap();

        let events = committed_patient(&store).await;
        let first = router.on_commit(&events, &MutationContext::local()).await.unwrap();
        assert_eq!(first.queued.len(), 1);
        let outcomes = first.wait().await;
        assert!(matches!(outcomes[0].1, EmissionOutcome::Sent { .. }));

        let second = router.on_commit(&events, &MutationContext::local()).await.unwrap();
        assert!(second.queued.is_empty());
        assert_eq!(second.skipped.len(), 1);

        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 1);
        let records = store.list_emissions(None).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].status, EmissionStatus::Sent);
        assert_eq!(records[0].trigger.as_deref(), Some("A28"));
        router.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_dispatch_claims_each_key_once() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let deliverer = Arc::new(Recording {
            calls: AtomicUsize::new(0),
            accept: true,
            delay: Duration::from_millis(20),
        });
        let router = Arc::new(
            EmissionRouter::builder(store.clone())
                .endpoint_with(endpoint("ris", Vec::new()), deliverer.clone())
                .build()
                .unwrap(),
        );

        let events = committed_patient(&store).await;
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let router = router.clone();
            let events = events.clone();
            tasks.push(tokio::spawn(async move {
                let report = router
                    .on_commit(&events, &MutationContext::local())
                    .await
                    .unwrap();
                report.wait().await.len()
            }));
        }
        let mut delivered = 0;
        for task in tasks {
            delivered += task.await.unwrap();
        }

        assert_eq!(delivered, 1);
        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 1);
        assert_eq!(store.list_emissions(None).await.unwrap().len(), 1);
        if let Ok(router) = Arc::try_unwrap(router) {
            router.shutdown().await;
        }
    }

    #[tokio::test]
    async fn test_admission_emits_movement_only() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let all = Recording::new(true);
        let patients_only = Recording::new(true);
        let router = EmissionRouter::builder(store.clone())
            .endpoint_with(endpoint("ris", Vec::new()), all.clone())
            .endpoint_with(endpoint("mpi", vec![EntityKind::Patient]), patients_only.clone())
            .build()
            .unwrap();

        let events = committed_admission(&store).await;
        let report = router
            .on_commit(&events, &MutationContext::local())
            .await
            .unwrap();
        let mut emitted: Vec<(String, String)> = report
            .queued
            .iter()
            .map(|q| (q.key.endpoint_id.to_string(), q.trigger.code().to_string()))
            .collect();
        emitted.sort();
        assert_eq!(
            emitted,
            vec![
                ("mpi".to_string(), "A28".to_string()),
                ("ris".to_string(), "A01".to_string()),
            ]
        );
        report.wait().await;

        assert_eq!(all.calls.load(Ordering::SeqCst), 1);
        assert_eq!(patients_only.calls.load(Ordering::SeqCst), 1);
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_payload_uses_committed_version() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let router = EmissionRouter::builder(store.clone())
            .endpoint_with(endpoint("ris", Vec::new()), Recording::new(true))
            .build()
            .unwrap();

        let first = committed_patient(&store).await;
        let mut renamed = store
            .find_patient(&PatientIdentifier::new("12345").unwrap())
            .await
            .unwrap()
            .unwrap();
        renamed.family_name = "SMITH".to_string();
        let mut set = ChangeSet::new(MutationContext::local());
        set.push(Change::PutPatient {
            patient: renamed,
            expected_version: Some(1),
        });
        let second = store.commit(set).await.unwrap();

        // Both commits landed before either is dispatched
        router
            .on_commit(&first, &MutationContext::local())
            .await
            .unwrap()
            .wait()
            .await;
        router
            .on_commit(&second, &MutationContext::local())
            .await
            .unwrap()
            .wait()
            .await;

        let mut messages = store.list_messages(&MessageQuery::default()).await.unwrap();
        messages.reverse();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].trigger.as_deref(), Some("A28"));
        assert!(messages[0].payload.contains("|DOE"));
        assert!(!messages[0].payload.contains("SMITH"));
        assert_eq!(messages[1].trigger.as_deref(), Some("A31"));
        assert!(messages[1].payload.contains("|SMITH"));
        router.shutdown().await;
    }

    #[tokio::test]
    async fn test_emission_origin_never_dispatches() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let deliverer = Recording::new(true);
        let router = EmissionRouter::builder(store.clone())
            .endpoint_with(endpoint("ris", Vec::new()), deliverer.clone())
            .build()
            .unwrap();

        let events = committed_patient(&store).await;
        let ctx = MutationContext::from_emission(None, "ECHO1");
        let report = router.on_commit(&events, &ctx).await.unwrap();
        assert!(report.suppressed);
        assert!(report.queued.is_empty());
        assert!(store.list_emissions(None).await.unwrap().is_empty());
        assert_eq!(deliverer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_refusal_and_scope() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let refusing = Recording::new(false);
        let movements_only = Recording::new(true);
        let router = EmissionRouter::builder(store.clone())
            .endpoint_with(endpoint("lab", Vec::new()), refusing.clone())
            .endpoint_with(
                endpoint("pacs", vec![EntityKind::Movement]),
                movements_only.clone(),
            )
            .build()
            .unwrap();

        let events = committed_patient(&store).await;
        let outcomes = router
            .on_commit(&events, &MutationContext::local())
            .await
            .unwrap()
            .wait()
            .await;
        assert_eq!(outcomes.len(), 1);
        match &outcomes[0].1 {
            EmissionOutcome::Failed { reason, ack_payload } => {
                assert!(reason.contains("rejected"));
                assert!(ack_payload.is_some());
            }
            other => panic!("unexpected outcome {other:?}"),
        }
        assert_eq!(movements_only.calls.load(Ordering::SeqCst), 0);

        let records = store.list_emissions(None).await.unwrap();
        assert_eq!(records[0].status, EmissionStatus::Error);
    }

    #[tokio::test]
    async fn test_timeout_is_failure() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let slow = Arc::new(Recording {
            calls: AtomicUsize::new(0),
            accept: true,
            delay: Duration::from_secs(5),
        });
        let mut ep = endpoint("slow", Vec::new());
        ep.timeout_seconds = Some(0);
        let router = EmissionRouter::builder(store.clone())
            .endpoint_with(ep, slow)
            .build()
            .unwrap();

        let events = committed_patient(&store).await;
        let outcomes = router
            .on_commit(&events, &MutationContext::local())
            .await
            .unwrap()
            .wait()
            .await;
        assert!(matches!(
            &outcomes[0].1,
            EmissionOutcome::Failed { reason, .. } if reason.contains("timed out")
        ));
    }

    #[tokio::test]
    async fn test_outbound_message_is_recorded() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let router = EmissionRouter::builder(store.clone())
            .sender("BRIDGE", "HOSP")
            .endpoint_with(endpoint("ris", Vec::new()), Recording::new(true))
            .build()
            .unwrap();

        let events = committed_patient(&store).await;
        router
            .on_commit(&events, &MutationContext::local())
            .await
            .unwrap()
            .wait()
            .await;

        let messages = store
            .list_messages(&MessageQuery::default())
            .await
            .unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].trigger.as_deref(), Some("A28"));
        assert!(messages[0].payload.starts_with("MSH|^~\\&|BRIDGE|HOSP|"));
    }

    #[tokio::test]
    async fn test_receiver_endpoints_get_no_lane() {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mut receiver = endpoint("his", Vec::new());
        receiver.role = EndpointRole::Receiver;
        let router = EmissionRouter::builder(store)
            .endpoint_with(receiver, Recording::new(true))
            .build()
            .unwrap();
        assert_eq!(router.targets().count(), 0);
    }
}
