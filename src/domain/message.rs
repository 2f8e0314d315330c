//! Raw wire messages
//!
//! Every message the bridge receives or sends is kept verbatim together with
//! its validation result and its fate, so that no processing outcome is lost.

use super::ids::EndpointId;
use crate::validation::ValidationResult;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Flow direction relative to the bridge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Inbound,
    Outbound,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Inbound => "inbound",
            Direction::Outbound => "outbound",
        }
    }
}

/// Wire-protocol family of a message payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    /// HL7 v2 pipe-delimited text
    Hl7v2,
    /// FHIR-shaped JSON
    Fhir,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Hl7v2 => "hl7v2",
            MessageKind::Fhir => "fhir",
        }
    }
}

/// What happened to an inbound message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageFate {
    /// Mutations committed and acknowledged with AA
    Processed,
    /// Failed validation on a reject-mode endpoint (AE)
    ValidationRejected,
    /// Refused by the encounter workflow (AE)
    TransitionRejected,
    /// Could not be parsed (AR)
    Unparseable,
    /// Processing fault after validation (AR)
    Failed,
}

impl MessageFate {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageFate::Processed => "processed",
            MessageFate::ValidationRejected => "validation_rejected",
            MessageFate::TransitionRejected => "transition_rejected",
            MessageFate::Unparseable => "unparseable",
            MessageFate::Failed => "failed",
        }
    }
}

/// One message as it crossed the wire
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    pub id: Uuid,
    pub direction: Direction,
    pub kind: MessageKind,
    /// Endpoint the message came from or went to
    pub endpoint_id: Option<EndpointId>,
    /// MSH-10 when it could be read
    pub control_id: Option<String>,
    pub trigger: Option<String>,
    pub payload: String,
    pub created_at: DateTime<Utc>,
    pub validation: Option<ValidationResult>,
    pub fate: Option<MessageFate>,
    /// Reason attached to a non-processed fate
    pub fate_detail: Option<String>,
}

impl RawMessage {
    /// Creates an inbound record for received text
    pub fn inbound(payload: impl Into<String>, endpoint_id: Option<EndpointId>) -> Self {
        Self::new(Direction::Inbound, MessageKind::Hl7v2, payload, endpoint_id)
    }

    /// Creates an outbound record for an emitted payload
    pub fn outbound(kind: MessageKind, payload: impl Into<String>, endpoint_id: EndpointId) -> Self {
        Self::new(Direction::Outbound, kind, payload, Some(endpoint_id))
    }

    fn new(
        direction: Direction,
        kind: MessageKind,
        payload: impl Into<String>,
        endpoint_id: Option<EndpointId>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            direction,
            kind,
            endpoint_id,
            control_id: None,
            trigger: None,
            payload: payload.into(),
            created_at: Utc::now(),
            validation: None,
            fate: None,
            fate_detail: None,
        }
    }

    pub fn with_header(mut self, control_id: Option<String>, trigger: Option<String>) -> Self {
        self.control_id = control_id.filter(|c| !c.is_empty());
        self.trigger = trigger.filter(|t| !t.is_empty());
        self
    }

    pub fn with_validation(mut self, validation: ValidationResult) -> Self {
        self.validation = Some(validation);
        self
    }

    pub fn with_fate(mut self, fate: MessageFate, detail: Option<String>) -> Self {
        self.fate = Some(fate);
        self.fate_detail = detail;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbound_defaults() {
        let msg = RawMessage::inbound("MSH|^~\\&|", None);
        assert_eq!(msg.direction, Direction::Inbound);
        assert_eq!(msg.kind, MessageKind::Hl7v2);
        assert!(msg.fate.is_none());
    }

    #[test]
    fn test_with_header_drops_empty_values() {
        let msg = RawMessage::inbound("x", None)
            .with_header(Some(String::new()), Some("A01".to_string()));
        assert!(msg.control_id.is_none());
        assert_eq!(msg.trigger.as_deref(), Some("A01"));
    }

    #[test]
    fn test_fate_serialization() {
        let json = serde_json::to_string(&MessageFate::TransitionRejected).unwrap();
        assert_eq!(json, "\"transition_rejected\"");
        assert_eq!(MessageFate::Unparseable.as_str(), "unparseable");
    }
}
