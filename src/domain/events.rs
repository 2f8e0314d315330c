//! Domain events, change sets and mutation context
//!
//! The persistence boundary takes a [`ChangeSet`] and returns one
//! [`DomainEvent`] per committed mutation. The emission router consumes those
//! events directly. The [`MutationContext`] travels with the change set so the
//! router can tell whether a mutation is itself the echo of an emission.

use super::encounter::{Encounter, Movement};
use super::ids::{EndpointId, EntityId};
use super::patient::Patient;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kinds of entity that produce domain events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Patient,
    Encounter,
    Movement,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Patient => "patient",
            EntityKind::Encounter => "encounter",
            EntityKind::Movement => "movement",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "patient" => Some(EntityKind::Patient),
            "encounter" => Some(EntityKind::Encounter),
            "movement" => Some(EntityKind::Movement),
            _ => None,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Mutation operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Insert,
    Update,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Insert => f.write_str("insert"),
            Operation::Update => f.write_str("update"),
        }
    }
}

/// One committed mutation
#[derive(Debug, Clone)]
pub struct DomainEvent {
    pub kind: EntityKind,
    pub entity_id: EntityId,
    pub operation: Operation,
    /// Version written by the commit
    pub version: u64,
    /// The entity as the commit left it
    pub entity: DomainEntity,
}

impl DomainEvent {
    /// Event for a mutation staged at `version`; `expected` is `None` for an insert
    pub fn committed(entity: DomainEntity, expected: Option<u64>, version: u64) -> Self {
        let entity_id = match &entity {
            DomainEntity::Patient(patient) => patient.id,
            DomainEntity::Encounter { encounter, .. } => encounter.id,
            DomainEntity::Movement { movement, .. } => movement.id,
        };
        Self {
            kind: entity.kind(),
            entity_id,
            operation: if expected.is_none() {
                Operation::Insert
            } else {
                Operation::Update
            },
            version,
            entity,
        }
    }
}

/// Where a mutation came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Origin {
    /// A message received from an external system
    Inbound { endpoint: EndpointId },
    /// The echo of one of our own emissions
    Emission { endpoint: Option<EndpointId> },
    /// Local administrative change
    Local,
}

/// Request-scoped context threaded from inbound processing to the post-commit
/// hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationContext {
    pub origin: Origin,
    /// Control id of the message that caused the mutation
    pub correlation_id: Option<String>,
}

impl MutationContext {
    pub fn inbound(endpoint: EndpointId, correlation_id: impl Into<String>) -> Self {
        Self {
            origin: Origin::Inbound { endpoint },
            correlation_id: Some(correlation_id.into()),
        }
    }

    pub fn from_emission(endpoint: Option<EndpointId>, correlation_id: impl Into<String>) -> Self {
        Self {
            origin: Origin::Emission { endpoint },
            correlation_id: Some(correlation_id.into()),
        }
    }

    pub fn local() -> Self {
        Self {
            origin: Origin::Local,
            correlation_id: None,
        }
    }

    /// Mutations echoing an emission must never be emitted again
    pub fn suppresses_emission(&self) -> bool {
        matches!(self.origin, Origin::Emission { .. })
    }

    /// Endpoint the mutation arrived from, if any
    pub fn source_endpoint(&self) -> Option<&EndpointId> {
        match &self.origin {
            Origin::Inbound { endpoint } => Some(endpoint),
            Origin::Emission { endpoint } => endpoint.as_ref(),
            Origin::Local => None,
        }
    }
}

/// One write in a change set
#[derive(Debug, Clone)]
pub enum Change {
    /// Insert (`expected_version = None`) or update a patient
    PutPatient {
        patient: Patient,
        expected_version: Option<u64>,
    },
    /// Insert (`expected_version = None`) or update an encounter
    PutEncounter {
        encounter: Encounter,
        expected_version: Option<u64>,
    },
    /// Record a newly appended movement
    InsertMovement { movement: Movement },
}

/// Writes committed together, or not at all
#[derive(Debug, Clone)]
pub struct ChangeSet {
    pub changes: Vec<Change>,
    pub context: MutationContext,
}

impl ChangeSet {
    pub fn new(context: MutationContext) -> Self {
        Self {
            changes: Vec::new(),
            context,
        }
    }

    pub fn push(&mut self, change: Change) {
        self.changes.push(change);
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.changes.len()
    }
}

/// Snapshot of a committed entity, used to build outbound payloads
#[derive(Debug, Clone)]
pub enum DomainEntity {
    Patient(Patient),
    Encounter {
        encounter: Encounter,
        patient: Patient,
    },
    Movement {
        movement: Movement,
        encounter: Encounter,
        patient: Patient,
    },
}

impl DomainEntity {
    pub fn kind(&self) -> EntityKind {
        match self {
            DomainEntity::Patient(_) => EntityKind::Patient,
            DomainEntity::Encounter { .. } => EntityKind::Encounter,
            DomainEntity::Movement { .. } => EntityKind::Movement,
        }
    }

    pub fn patient(&self) -> &Patient {
        match self {
            DomainEntity::Patient(patient) => patient,
            DomainEntity::Encounter { patient, .. } => patient,
            DomainEntity::Movement { patient, .. } => patient,
        }
    }
}
