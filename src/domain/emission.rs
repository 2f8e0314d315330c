//! Emission records
//!
//! One record per (entity id, entity version, endpoint). The key is claimed
//! atomically before any delivery attempt, which makes emission at-most-once
//! per change and endpoint.

use super::events::EntityKind;
use super::ids::{EndpointId, EntityId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Delivery status of an emission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionStatus {
    /// Claimed and built, delivery outcome not yet known
    Generated,
    Sent,
    Error,
}

impl EmissionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EmissionStatus::Generated => "generated",
            EmissionStatus::Sent => "sent",
            EmissionStatus::Error => "error",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "generated" => Some(EmissionStatus::Generated),
            "sent" => Some(EmissionStatus::Sent),
            "error" => Some(EmissionStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for EmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Uniqueness key of an emission
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EmissionKey {
    pub entity_id: EntityId,
    pub version: u64,
    pub endpoint_id: EndpointId,
}

impl fmt::Display for EmissionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}->{}", self.entity_id, self.version, self.endpoint_id)
    }
}

/// Persisted outcome of one emission
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmissionRecord {
    pub id: Uuid,
    pub key: EmissionKey,
    pub entity_kind: EntityKind,
    /// Outbound trigger, when the payload is an HL7 v2 event
    pub trigger: Option<String>,
    pub status: EmissionStatus,
    /// Raw acknowledgement or response body
    pub ack_payload: Option<String>,
    /// Failure reason for status `error`
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl EmissionRecord {
    /// New record in status `generated`
    pub fn generated(key: EmissionKey, entity_kind: EntityKind, trigger: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            key,
            entity_kind,
            trigger,
            status: EmissionStatus::Generated,
            ack_payload: None,
            error: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Final outcome of a delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmissionOutcome {
    Sent { ack_payload: Option<String> },
    Failed { reason: String, ack_payload: Option<String> },
}

impl EmissionOutcome {
    pub fn status(&self) -> EmissionStatus {
        match self {
            EmissionOutcome::Sent { .. } => EmissionStatus::Sent,
            EmissionOutcome::Failed { .. } => EmissionStatus::Error,
        }
    }
}
