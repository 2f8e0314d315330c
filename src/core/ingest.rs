//! Inbound message processing
//!
//! [`InboundProcessor::process`] takes the text of one frame through the whole
//! pipeline and returns the acknowledgement to answer:
//!
//! 1. parse (`AR`, fate `unparseable` on failure)
//! 2. identify the sending endpoint and its validation policy
//! 3. validate and record the message with its result
//! 4. answer `AE` when the result fails under mode `reject`
//! 5. map the message to a change set, checking the encounter workflow
//!    (`AE`, fate `transition_rejected` when refused)
//! 6. commit, then hand the domain events to the emission router
//! 7. answer `AA`
//!
//! Every message is recorded with its final fate, whatever the outcome.

use crate::adapters::database::Store;
use crate::config::BridgeConfig;
use crate::domain::encounter::{Encounter, Movement, PatientClass};
use crate::domain::endpoint::{Endpoint, ValidationMode};
use crate::domain::errors::{FrameError, TransitionError};
use crate::domain::events::{Change, ChangeSet, DomainEvent, MutationContext, Origin};
use crate::domain::ids::{EncounterIdentifier, PatientIdentifier};
use crate::domain::message::{MessageFate, RawMessage};
use crate::domain::patient::Patient;
use crate::domain::{BridgeError, Result};
use crate::emission::{DispatchReport, EmissionRouter};
use crate::hl7::{parse_to_utc, Message, MessageHeader, TriggerEvent};
use crate::transport::AckBuilder;
use crate::validation::{ValidationEngine, ValidationResult};
use crate::{log_error_with_context, log_inbound_message, log_validation_issues};
use std::sync::Arc;

/// What happened to one inbound message
#[derive(Debug)]
pub struct ProcessOutcome {
    /// Acknowledgement text to answer
    pub ack: String,
    pub fate: MessageFate,
    pub control_id: String,
    pub validation: Option<ValidationResult>,
    /// Events of the committed change set
    pub events: Vec<DomainEvent>,
    /// Emissions started by the commit
    pub dispatch: Option<DispatchReport>,
}

/// Where a message came from and how it is validated
struct Source<'a> {
    endpoint: Option<&'a Endpoint>,
    profile: &'a str,
    mode: ValidationMode,
}

/// Runs the inbound pipeline for every received message
pub struct InboundProcessor {
    store: Arc<dyn Store>,
    router: Arc<EmissionRouter>,
    engine: ValidationEngine,
    acks: AckBuilder,
    endpoints: Vec<Endpoint>,
    default_profile: String,
    default_mode: ValidationMode,
    sending_application: String,
    sending_facility: String,
}

impl InboundProcessor {
    pub fn new(config: &BridgeConfig, store: Arc<dyn Store>, router: Arc<EmissionRouter>) -> Self {
        let app = &config.application;
        Self {
            store,
            router,
            engine: ValidationEngine::new(config.profile_registry()),
            acks: AckBuilder::new(app.sending_application.clone(), app.sending_facility.clone()),
            endpoints: config.endpoints.clone(),
            default_profile: config.listener.validation_profile.clone(),
            default_mode: config.listener.validation_mode,
            sending_application: app.sending_application.clone(),
            sending_facility: app.sending_facility.clone(),
        }
    }

    pub fn router(&self) -> &Arc<EmissionRouter> {
        &self.router
    }

    /// `AR` answered for a frame that could not be decoded
    pub fn frame_error_ack(&self, error: &FrameError) -> String {
        tracing::warn!(error = %error, "Rejecting malformed frame");
        self.acks
            .error(&MessageHeader::default(), "FRAME_ERROR", &error.to_string())
    }

    /// Processes the text of one frame
    pub async fn process(&self, text: &str) -> ProcessOutcome {
        let message = match Message::parse(text) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, bytes = text.len(), "Unparseable message");
                let raw = RawMessage::inbound(text, None)
                    .with_fate(MessageFate::Unparseable, Some(e.to_string()));
                self.record(&raw).await;
                return ProcessOutcome {
                    ack: self
                        .acks
                        .error(&MessageHeader::default(), "MSH_PARSE", &e.to_string()),
                    fate: MessageFate::Unparseable,
                    control_id: String::new(),
                    validation: None,
                    events: Vec::new(),
                    dispatch: None,
                };
            }
        };

        let header = message.header();
        let source = self.identify(&header);
        let trigger = message.trigger();
        let trigger_code = trigger.as_ref().map(|t| t.code().to_string());
        let endpoint_label = source
            .endpoint
            .map(|e| e.id.to_string())
            .unwrap_or_else(|| header.sending_application.clone());
        log_inbound_message!(
            endpoint_label,
            header.control_id,
            trigger_code.as_deref().unwrap_or(""),
            text.len()
        );

        let validation = self.engine.validate(&message, source.profile);
        log_validation_issues!(header.control_id, &validation);

        let raw = RawMessage::inbound(text, source.endpoint.map(|e| e.id.clone()))
            .with_header(Some(header.control_id.clone()), trigger_code)
            .with_validation(validation.clone());
        self.record(&raw).await;

        let mut outcome = ProcessOutcome {
            ack: String::new(),
            fate: MessageFate::Processed,
            control_id: header.control_id.clone(),
            validation: Some(validation.clone()),
            events: Vec::new(),
            dispatch: None,
        };

        if validation.is_fail() && source.mode == ValidationMode::Reject {
            let (code, text) = validation
                .first_error()
                .map(|i| (i.code.clone(), i.message.clone()))
                .unwrap_or_else(|| ("VALIDATION_FAILED".to_string(), "validation failed".to_string()));
            outcome.ack = self.acks.reject(&header, &code, &text);
            outcome.fate = MessageFate::ValidationRejected;
            self.record(&raw.with_fate(MessageFate::ValidationRejected, Some(code)))
                .await;
            return outcome;
        }

        let context = self.context_for(&header, &source);
        let result = match self.changes_for(&message, trigger, context.clone()).await {
            Ok(changes) => self.apply(changes, &context).await,
            Err(e) => Err(e),
        };

        match result {
            Ok((events, dispatch)) => {
                outcome.ack = self.acks.accept(&header);
                outcome.events = events;
                outcome.dispatch = dispatch;
                self.record(&raw.with_fate(MessageFate::Processed, None)).await;
            }
            Err(BridgeError::Transition(e)) => {
                tracing::warn!(control_id = %header.control_id, error = %e, "Workflow refused message");
                outcome.ack = self.acks.reject(&header, transition_code(&e), &e.to_string());
                outcome.fate = MessageFate::TransitionRejected;
                self.record(&raw.with_fate(MessageFate::TransitionRejected, Some(e.to_string())))
                    .await;
            }
            Err(BridgeError::Transform(reason)) => {
                tracing::warn!(control_id = %header.control_id, reason = %reason, "Message cannot be applied");
                outcome.ack = self.acks.reject(&header, "MESSAGE_UNMAPPABLE", &reason);
                outcome.fate = MessageFate::ValidationRejected;
                self.record(&raw.with_fate(MessageFate::ValidationRejected, Some(reason)))
                    .await;
            }
            Err(e) => {
                log_error_with_context!(e, "Failed to apply message");
                outcome.ack = self.acks.error(&header, "PROCESSING_FAILED", &e.to_string());
                outcome.fate = MessageFate::Failed;
                self.record(&raw.with_fate(MessageFate::Failed, Some(e.to_string())))
                    .await;
            }
        }
        outcome
    }

    fn identify<'a>(&'a self, header: &MessageHeader) -> Source<'a> {
        match self
            .endpoints
            .iter()
            .find(|e| e.matches_sender(&header.sending_application))
        {
            Some(endpoint) => Source {
                endpoint: Some(endpoint),
                profile: &endpoint.validation_profile,
                mode: endpoint.validation_mode,
            },
            None => Source {
                endpoint: None,
                profile: &self.default_profile,
                mode: self.default_mode,
            },
        }
    }

    /// Messages carrying our own sending identity, or arriving on a loopback
    /// endpoint, are echoes of our emissions
    fn context_for(&self, header: &MessageHeader, source: &Source<'_>) -> MutationContext {
        let endpoint = source.endpoint.map(|e| e.id.clone());
        let own_identity = header.sending_application == self.sending_application
            && header.sending_facility == self.sending_facility;
        let loopback = source.endpoint.map(|e| e.loopback).unwrap_or(false);

        if own_identity || loopback {
            tracing::debug!(
                control_id = %header.control_id,
                own_identity,
                loopback,
                "Message echoes an emission"
            );
            return MutationContext::from_emission(endpoint, header.control_id.clone());
        }
        match endpoint {
            Some(endpoint) => MutationContext::inbound(endpoint, header.control_id.clone()),
            None => MutationContext {
                origin: Origin::Local,
                correlation_id: Some(header.control_id.clone()),
            },
        }
    }

    /// Builds the writes a message asks for, checking the workflow
    async fn changes_for(
        &self,
        message: &Message,
        trigger: Option<TriggerEvent>,
        context: MutationContext,
    ) -> Result<ChangeSet> {
        let trigger = trigger
            .ok_or_else(|| BridgeError::Transform("message carries no trigger event".to_string()))?;
        let mut changes = ChangeSet::new(context);

        let incoming = patient_from_pid(message)?;
        let patient = match self.store.find_patient(&incoming.identifier).await? {
            Some(mut stored) => {
                let expected = stored.version;
                if stored.merge_demographics(&incoming) {
                    changes.push(Change::PutPatient {
                        patient: stored.clone(),
                        expected_version: Some(expected),
                    });
                }
                stored
            }
            None => {
                changes.push(Change::PutPatient {
                    patient: incoming.clone(),
                    expected_version: None,
                });
                incoming
            }
        };

        if trigger.is_identity_only() {
            return Ok(changes);
        }

        let class = message
            .segment("PV1")
            .and_then(|pv1| PatientClass::from_code(pv1.field(2)));

        if trigger == TriggerEvent::A08 {
            let encounter = self
                .existing_encounter(message, &patient)
                .await?
                .ok_or_else(|| TransitionError::UnknownEncounter {
                    trigger: trigger.code().to_string(),
                    encounter: message.visit_number().unwrap_or_default(),
                })?;
            encounter
                .workflow()?
                .check(&trigger, class.unwrap_or(encounter.patient_class))?;
            return Ok(changes);
        }

        if !trigger.is_movement() {
            return Err(BridgeError::Transform(format!(
                "trigger {trigger} is not handled"
            )));
        }

        let mut encounter = match self.existing_encounter(message, &patient).await? {
            Some(encounter) if encounter.patient_id != patient.id => {
                return Err(BridgeError::Transform(format!(
                    "visit {} belongs to another patient",
                    encounter.identifier
                )))
            }
            Some(encounter) if !trigger.is_initial() || encounter.current_state.is_active() => {
                encounter
            }
            Some(encounter) if message.visit_number().is_some() => encounter,
            _ => {
                let identifier = match message.visit_number() {
                    Some(visit) => EncounterIdentifier::new(visit)
                        .map_err(|e| BridgeError::Transform(format!("PV1-19: {e}")))?,
                    None => EncounterIdentifier::generate(),
                };
                Encounter::new(identifier, patient.id, patient.identifier.clone())
            }
        };

        let movement = movement_from(message, trigger, class.unwrap_or(encounter.patient_class))?;
        let movement = encounter.append_movement(movement)?;
        let expected_version = (encounter.version > 0).then_some(encounter.version);

        changes.push(Change::PutEncounter {
            encounter,
            expected_version,
        });
        changes.push(Change::InsertMovement { movement });
        Ok(changes)
    }

    /// Encounter named by PV1-19, else the patient's latest one
    async fn existing_encounter(&self, message: &Message, patient: &Patient) -> Result<Option<Encounter>> {
        if let Some(visit) = message.visit_number() {
            let identifier = EncounterIdentifier::new(visit)
                .map_err(|e| BridgeError::Transform(format!("PV1-19: {e}")))?;
            return self.store.find_encounter(&identifier).await;
        }
        if patient.version == 0 {
            return Ok(None);
        }
        self.store.latest_encounter(patient.id).await
    }

    async fn apply(
        &self,
        changes: ChangeSet,
        context: &MutationContext,
    ) -> Result<(Vec<DomainEvent>, Option<DispatchReport>)> {
        if changes.is_empty() {
            tracing::debug!("Message changes nothing");
            return Ok((Vec::new(), None));
        }
        let events = self.store.commit(changes).await?;
        tracing::debug!(events = events.len(), "Committed change set");

        let dispatch = match self.router.on_commit(&events, context).await {
            Ok(report) => Some(report),
            Err(e) => {
                log_error_with_context!(e, "Emission dispatch failed");
                None
            }
        };
        Ok((events, dispatch))
    }

    async fn record(&self, message: &RawMessage) {
        if let Err(e) = self.store.record_message(message).await {
            tracing::error!(message_id = %message.id, error = %e, "Failed to record message");
        }
    }
}

fn transition_code(error: &TransitionError) -> &'static str {
    match error {
        TransitionError::NotAllowed { .. } => "WORKFLOW_INVALID_TRANSITION",
        TransitionError::UnknownEncounter { .. } => "WORKFLOW_UNKNOWN_ENCOUNTER",
        TransitionError::NothingToCancel { .. } => "WORKFLOW_NOTHING_TO_CANCEL",
    }
}

/// Patient described by PID
fn patient_from_pid(message: &Message) -> Result<Patient> {
    let pid = message
        .segment("PID")
        .ok_or_else(|| BridgeError::Transform("message has no PID segment".to_string()))?;
    let identifier = message
        .patient_identifier()
        .ok_or_else(|| BridgeError::Transform("PID-3 carries no identifier".to_string()))?;
    let identifier = PatientIdentifier::new(identifier)
        .map_err(|e| BridgeError::Transform(format!("PID-3: {e}")))?;

    let seps = message.separators();
    let value = |raw: &str| {
        if raw.is_empty() {
            None
        } else {
            Some(seps.unescape(raw))
        }
    };

    let mut patient = Patient::new(identifier, seps.unescape(pid.component(5, 1)));
    patient.assigning_authority = value(pid.component(3, 4));
    patient.given_name = value(pid.component(5, 2));
    patient.birth_date = value(pid.component(7, 1));
    patient.sex = value(pid.field(8));
    Ok(patient)
}

/// Movement described by EVN, PV1 and ZBE
fn movement_from(message: &Message, trigger: TriggerEvent, class: PatientClass) -> Result<Movement> {
    let zbe = message.segment("ZBE");
    let pv1 = message.segment("PV1");
    let non_empty = |s: &str| (!s.is_empty()).then(|| message.separators().unescape(s));

    let occurred_at = zbe
        .map(|z| z.component(2, 1))
        .filter(|v| !v.is_empty())
        .or_else(|| message.event_timestamp())
        .and_then(parse_to_utc);
    let unit = zbe
        .and_then(|z| non_empty(z.component(7, 1)))
        .or_else(|| pv1.and_then(|p| non_empty(p.component(3, 1))));
    let nature = zbe.and_then(|z| non_empty(z.field(9)));

    let mut builder = Movement::builder()
        .trigger(trigger)
        .patient_class(class)
        .responsible_unit(unit)
        .nature(nature);
    if let Some(at) = occurred_at {
        builder = builder.occurred_at(at);
    }
    builder.build().map_err(BridgeError::Transform)
}
