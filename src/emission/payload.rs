//! Outbound payload transforms
//!
//! A transform turns a committed entity snapshot into the bytes sent to one
//! endpoint. Two strategies are supported:
//!
//! - **HL7 v2**: pipe-delimited ADT messages for MLLP endpoints
//! - **FHIR**: a JSON message `Bundle` for HTTP endpoints
//!
//! The router picks the transform from the endpoint's transport and treats
//! both the same way.

use crate::domain::encounter::{Encounter, Movement};
use crate::domain::endpoint::{Endpoint, EndpointTransport};
use crate::domain::events::DomainEntity;
use crate::domain::message::MessageKind;
use crate::domain::patient::Patient;
use crate::domain::{BridgeError, Result};
use crate::hl7::{format_timestamp, new_control_id, Separators, TriggerEvent};
use crate::workflow::EncounterState;
use chrono::Utc;
use serde_json::{json, Value};

/// One payload ready for delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundPayload {
    pub kind: MessageKind,
    pub body: String,
    /// MSH-10 or the FHIR message header id
    pub control_id: String,
    pub trigger: TriggerEvent,
}

/// Builds the outbound representation of an entity
pub trait PayloadTransform: Send + Sync {
    fn kind(&self) -> MessageKind;

    /// Builds the payload announcing `trigger` for `entity` to `endpoint`
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Transform` when the entity cannot be expressed
    /// in this format.
    fn to_payload(
        &self,
        entity: &DomainEntity,
        trigger: &TriggerEvent,
        endpoint: &Endpoint,
    ) -> Result<OutboundPayload>;
}

/// Transform matching the endpoint's transport
pub fn transform_for(
    endpoint: &Endpoint,
    sending_application: &str,
    sending_facility: &str,
) -> Box<dyn PayloadTransform> {
    match endpoint.transport {
        EndpointTransport::Mllp { .. } => Box::new(Hl7v2Transform::new(
            sending_application,
            sending_facility,
        )),
        EndpointTransport::FhirHttp { .. } => Box::new(FhirTransform::new(sending_application)),
    }
}

/// Builds HL7 v2.5 ADT messages
#[derive(Debug, Clone)]
pub struct Hl7v2Transform {
    sending_application: String,
    sending_facility: String,
    separators: Separators,
}

impl Hl7v2Transform {
    pub fn new(sending_application: impl Into<String>, sending_facility: impl Into<String>) -> Self {
        Self {
            sending_application: sending_application.into(),
            sending_facility: sending_facility.into(),
            separators: Separators::default(),
        }
    }

    fn esc(&self, value: &str) -> String {
        self.separators.escape(value)
    }

    fn msh(&self, trigger: &TriggerEvent, control_id: &str, endpoint: &Endpoint) -> String {
        let receiver = if endpoint.name.is_empty() {
            endpoint.id.as_str()
        } else {
            endpoint.name.as_str()
        };
        format!(
            "MSH|{}|{}|{}|{}||{}||ADT^{}^{}|{}|P|2.5",
            self.separators.encoding_characters(),
            self.esc(&self.sending_application),
            self.esc(&self.sending_facility),
            self.esc(receiver),
            format_timestamp(Utc::now()),
            trigger.code(),
            trigger.structure(),
            control_id,
        )
    }

    fn pid(&self, patient: &Patient) -> String {
        let mut identifier = self.esc(patient.identifier.as_str());
        if let Some(authority) = &patient.assigning_authority {
            identifier.push_str(&format!("^^^{}", self.esc(authority)));
        }
        let mut name = self.esc(&patient.family_name);
        if let Some(given) = &patient.given_name {
            name.push('^');
            name.push_str(&self.esc(given));
        }
        format!(
            "PID|1||{}||{}||{}|{}",
            identifier,
            name,
            patient.birth_date.as_deref().map(|d| self.esc(d)).unwrap_or_default(),
            patient.sex.as_deref().map(|s| self.esc(s)).unwrap_or_default(),
        )
    }

    /// PV1 with class, location (PV1-3) and visit number (PV1-19)
    fn pv1(&self, class: &str, location: Option<&str>, visit: Option<&str>) -> String {
        let mut fields = vec![String::new(); 20];
        fields[0] = "PV1".to_string();
        fields[1] = "1".to_string();
        fields[2] = class.to_string();
        fields[3] = location.map(|l| self.esc(l)).unwrap_or_default();
        fields[19] = visit.map(|v| self.esc(v)).unwrap_or_default();
        fields.join("|")
    }

    fn zbe(&self, movement: &Movement) -> String {
        let (action, cancelled) = match movement.trigger.cancels() {
            Some(original) => (
                "CANCEL",
                original.first().map(|t| t.code().to_string()).unwrap_or_default(),
            ),
            None => ("INSERT", String::new()),
        };
        format!(
            "ZBE|{}^{}|{}||{}|N|{}|{}||{}",
            movement.id,
            self.esc(&self.sending_application),
            format_timestamp(movement.occurred_at),
            action,
            cancelled,
            movement.responsible_unit.as_deref().map(|u| self.esc(u)).unwrap_or_default(),
            movement.nature.as_deref().map(|n| self.esc(n)).unwrap_or_default(),
        )
    }

    fn encounter_pv1(&self, encounter: &Encounter, class: &str) -> String {
        self.pv1(
            class,
            encounter.location.as_deref(),
            Some(encounter.identifier.as_str()),
        )
    }
}

impl PayloadTransform for Hl7v2Transform {
    fn kind(&self) -> MessageKind {
        MessageKind::Hl7v2
    }

    fn to_payload(
        &self,
        entity: &DomainEntity,
        trigger: &TriggerEvent,
        endpoint: &Endpoint,
    ) -> Result<OutboundPayload> {
        let control_id = new_control_id();
        let recorded_at = match entity {
            DomainEntity::Movement { movement, .. } => movement.occurred_at,
            _ => Utc::now(),
        };

        let mut segments = vec![
            self.msh(trigger, &control_id, endpoint),
            format!("EVN|{}|{}", trigger.code(), format_timestamp(recorded_at)),
            self.pid(entity.patient()),
        ];
        match entity {
            DomainEntity::Patient(_) => segments.push(self.pv1("N", None, None)),
            DomainEntity::Encounter { encounter, .. } => {
                segments.push(self.encounter_pv1(encounter, encounter.patient_class.code()))
            }
            DomainEntity::Movement {
                movement,
                encounter,
                ..
            } => {
                if !trigger.is_movement() {
                    return Err(BridgeError::Transform(format!(
                        "trigger {trigger} cannot announce a movement"
                    )));
                }
                segments.push(self.encounter_pv1(encounter, movement.patient_class.code()));
                segments.push(self.zbe(movement));
            }
        }

        let mut body = segments.join("\r");
        body.push('\r');
        Ok(OutboundPayload {
            kind: MessageKind::Hl7v2,
            body,
            control_id,
            trigger: trigger.clone(),
        })
    }
}

/// Builds FHIR-shaped JSON message bundles
#[derive(Debug, Clone)]
pub struct FhirTransform {
    source_name: String,
}

impl FhirTransform {
    pub fn new(source_name: impl Into<String>) -> Self {
        Self {
            source_name: source_name.into(),
        }
    }
}

fn gender(sex: Option<&str>) -> &'static str {
    match sex {
        Some("F") => "female",
        Some("M") => "male",
        Some("O") | Some("A") | Some("N") => "other",
        _ => "unknown",
    }
}

/// HL7 `YYYYMMDD[...]` to FHIR `YYYY-MM-DD`
fn birth_date(value: &str) -> Option<String> {
    let digits = value.get(..8)?;
    if !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("{}-{}-{}", &digits[..4], &digits[4..6], &digits[6..8]))
}

fn encounter_status(state: EncounterState) -> &'static str {
    match state {
        EncounterState::NoEncounter => "unknown",
        EncounterState::PreAdmittedInpatient | EncounterState::PreAdmittedOutpatient => "planned",
        EncounterState::Outpatient | EncounterState::Admitted => "in-progress",
        EncounterState::OnLeave => "onleave",
        EncounterState::Discharged => "finished",
        EncounterState::Cancelled => "cancelled",
    }
}

fn patient_resource(patient: &Patient) -> Value {
    let mut identifier = json!({ "value": patient.identifier.as_str() });
    if let Some(authority) = &patient.assigning_authority {
        identifier["system"] = json!(format!("urn:oid:{authority}"));
    }
    let mut name = json!({ "family": patient.family_name });
    if let Some(given) = &patient.given_name {
        name["given"] = json!([given]);
    }
    let mut resource = json!({
        "resourceType": "Patient",
        "id": patient.id.to_string(),
        "identifier": [identifier],
        "name": [name],
        "gender": gender(patient.sex.as_deref()),
    });
    if let Some(date) = patient.birth_date.as_deref().and_then(birth_date) {
        resource["birthDate"] = json!(date);
    }
    resource
}

fn encounter_resource(encounter: &Encounter, class_code: &str) -> Value {
    let mut resource = json!({
        "resourceType": "Encounter",
        "id": encounter.id.to_string(),
        "identifier": [{ "value": encounter.identifier.as_str() }],
        "status": encounter_status(encounter.current_state),
        "class": {
            "system": "http://terminology.hl7.org/CodeSystem/v2-0004",
            "code": class_code,
        },
        "subject": { "reference": format!("Patient/{}", encounter.patient_id) },
    });
    if let Some(location) = &encounter.location {
        resource["location"] = json!([{ "location": { "display": location } }]);
    }
    resource
}

impl PayloadTransform for FhirTransform {
    fn kind(&self) -> MessageKind {
        MessageKind::Fhir
    }

    fn to_payload(
        &self,
        entity: &DomainEntity,
        trigger: &TriggerEvent,
        endpoint: &Endpoint,
    ) -> Result<OutboundPayload> {
        let control_id = new_control_id();
        let patient = entity.patient();

        let mut resources = vec![patient_resource(patient)];
        let mut focus = vec![json!({ "reference": format!("Patient/{}", patient.id) })];
        match entity {
            DomainEntity::Patient(_) => {}
            DomainEntity::Encounter { encounter, .. } => {
                resources.push(encounter_resource(encounter, encounter.patient_class.code()));
                focus.push(json!({ "reference": format!("Encounter/{}", encounter.id) }));
            }
            DomainEntity::Movement {
                movement,
                encounter,
                ..
            } => {
                resources.push(encounter_resource(encounter, movement.patient_class.code()));
                focus.push(json!({ "reference": format!("Encounter/{}", encounter.id) }));
            }
        }

        let header = json!({
            "resourceType": "MessageHeader",
            "id": control_id,
            "eventCoding": {
                "system": "http://terminology.hl7.org/CodeSystem/v2-0003",
                "code": trigger.code(),
            },
            "source": { "name": self.source_name },
            "destination": [{ "name": endpoint.id.as_str(), "endpoint": endpoint.peer() }],
            "focus": focus,
        });

        let entries: Vec<Value> = std::iter::once(header)
            .chain(resources)
            .map(|resource| {
                let id = resource["id"].as_str().unwrap_or_default().to_string();
                json!({ "fullUrl": format!("urn:uuid:{id}"), "resource": resource })
            })
            .collect();

        let bundle = json!({
            "resourceType": "Bundle",
            "id": uuid::Uuid::new_v4().to_string(),
            "type": "message",
            "timestamp": Utc::now().to_rfc3339(),
            "entry": entries,
        });

        Ok(OutboundPayload {
            kind: MessageKind::Fhir,
            body: serde_json::to_string(&bundle)?,
            control_id,
            trigger: trigger.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::endpoint::{EndpointRole, ValidationMode};
    use crate::domain::ids::{EncounterIdentifier, EndpointId, PatientIdentifier};
    use crate::hl7::Message;
    use crate::validation::{ProfileRegistry, ValidationEngine, ValidationLevel, PAM_PROFILE};

    fn endpoint(transport: EndpointTransport) -> Endpoint {
        Endpoint {
            id: EndpointId::new("ris").unwrap(),
            name: "RIS".to_string(),
            role: EndpointRole::Sender,
            enabled: true,
            transport,
            validation_profile: "base".to_string(),
            validation_mode: ValidationMode::Warn,
            scope: Vec::new(),
            loopback: false,
            timeout_seconds: None,
        }
    }

    fn mllp() -> Endpoint {
        endpoint(EndpointTransport::Mllp {
            host: "127.0.0.1".to_string(),
            port: 2576,
        })
    }

    fn patient() -> Patient {
        let mut patient = Patient::new(PatientIdentifier::new("12345").unwrap(), "DOE");
        patient.given_name = Some("JANE".to_string());
        patient.birth_date = Some("19800101".to_string());
        patient.sex = Some("F".to_string());
        patient.assigning_authority = Some("HOSP".to_string());
        patient.version = 1;
        patient
    }

    fn admission() -> DomainEntity {
        let patient = patient();
        let mut encounter = Encounter::new(
            EncounterIdentifier::new("V001").unwrap(),
            patient.id,
            patient.identifier.clone(),
        );
        let movement = encounter
            .append_movement(
                Movement::builder()
                    .trigger(TriggerEvent::A01)
                    .responsible_unit(Some("CARDIO".to_string()))
                    .nature(Some("S".to_string()))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        DomainEntity::Movement {
            movement,
            encounter,
            patient,
        }
    }

    #[test]
    fn test_hl7_movement_payload_validates_under_pam() {
        let transform = Hl7v2Transform::new("MEDBRIDGE", "HOSP");
        let payload = transform
            .to_payload(&admission(), &TriggerEvent::A01, &mllp())
            .unwrap();
        assert_eq!(payload.kind, MessageKind::Hl7v2);

        let message = Message::parse(&payload.body).unwrap();
        let header = message.header();
        assert_eq!(header.sending_application, "MEDBRIDGE");
        assert_eq!(header.receiving_application, "RIS");
        assert_eq!(header.trigger, "A01");
        assert_eq!(header.control_id, payload.control_id);
        assert_eq!(message.visit_number().as_deref(), Some("V001"));
        assert_eq!(message.patient_identifier().as_deref(), Some("12345"));

        let zbe = message.segment("ZBE").unwrap();
        assert_eq!(zbe.field(4), "INSERT");
        assert_eq!(zbe.field(7), "CARDIO");

        let engine = ValidationEngine::new(ProfileRegistry::default());
        let result = engine.validate(&message, PAM_PROFILE);
        assert_eq!(result.level, ValidationLevel::Ok, "{:?}", result.issues);
    }

    #[test]
    fn test_hl7_patient_payload_has_no_movement_segment() {
        let transform = Hl7v2Transform::new("MEDBRIDGE", "HOSP");
        let entity = DomainEntity::Patient(patient());
        let payload = transform
            .to_payload(&entity, &TriggerEvent::A28, &mllp())
            .unwrap();
        let message = Message::parse(&payload.body).unwrap();
        assert!(!message.has_segment("ZBE"));
        assert_eq!(message.segment("PV1").unwrap().field(2), "N");
        assert!(payload.body.ends_with('\r'));
    }

    #[test]
    fn test_hl7_values_are_escaped() {
        let mut p = patient();
        p.family_name = "O|BRIEN".to_string();
        let transform = Hl7v2Transform::new("MEDBRIDGE", "HOSP");
        let payload = transform
            .to_payload(&DomainEntity::Patient(p), &TriggerEvent::A31, &mllp())
            .unwrap();
        assert!(payload.body.contains("O\\F\\BRIEN"));
    }

    #[test]
    fn test_hl7_rejects_non_movement_trigger_for_movement() {
        let transform = Hl7v2Transform::new("MEDBRIDGE", "HOSP");
        let result = transform.to_payload(&admission(), &TriggerEvent::A31, &mllp());
        assert!(matches!(result, Err(BridgeError::Transform(_))));
    }

    #[test]
    fn test_fhir_bundle_shape() {
        let ep = endpoint(EndpointTransport::FhirHttp {
            base_url: "http://fhir.example.org/fhir".to_string(),
        });
        let payload = FhirTransform::new("MEDBRIDGE")
            .to_payload(&admission(), &TriggerEvent::A01, &ep)
            .unwrap();
        assert_eq!(payload.kind, MessageKind::Fhir);

        let bundle: Value = serde_json::from_str(&payload.body).unwrap();
        assert_eq!(bundle["type"], "message");
        let entries = bundle["entry"].as_array().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["resource"]["resourceType"], "MessageHeader");
        assert_eq!(entries[0]["resource"]["eventCoding"]["code"], "A01");
        assert_eq!(entries[1]["resource"]["gender"], "female");
        assert_eq!(entries[1]["resource"]["birthDate"], "1980-01-01");
        assert_eq!(entries[2]["resource"]["status"], "in-progress");
    }

    #[test]
    fn test_transform_follows_transport() {
        assert_eq!(transform_for(&mllp(), "A", "F").kind(), MessageKind::Hl7v2);
        let ep = endpoint(EndpointTransport::FhirHttp {
            base_url: "http://fhir.example.org".to_string(),
        });
        assert_eq!(transform_for(&ep, "A", "F").kind(), MessageKind::Fhir);
    }
}
