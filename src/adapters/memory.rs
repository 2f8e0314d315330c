//! In-memory storage backend
//!
//! Everything lives behind one `tokio::sync::RwLock`, so a change set is
//! applied under a single write lock and is therefore atomic. Used by tests
//! and by deployments that do not need durability.

use crate::adapters::database::traits::{next_version, MessageQuery, Store};
use crate::domain::emission::{EmissionKey, EmissionOutcome, EmissionRecord};
use crate::domain::encounter::Encounter;
use crate::domain::errors::StoreError;
use crate::domain::events::{Change, ChangeSet, DomainEntity, DomainEvent, EntityKind};
use crate::domain::ids::{EncounterIdentifier, EntityId, PatientIdentifier};
use crate::domain::message::RawMessage;
use crate::domain::patient::Patient;
use crate::domain::{BridgeError, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
    messages: Vec<RawMessage>,
    message_index: HashMap<Uuid, usize>,
    patients: HashMap<EntityId, Patient>,
    patients_by_identifier: HashMap<String, EntityId>,
    encounters: HashMap<EntityId, Encounter>,
    encounters_by_identifier: HashMap<String, EntityId>,
    /// Creation order, used for "latest encounter of a patient"
    encounter_order: Vec<EntityId>,
    /// Movement id to owning encounter id
    movements: HashMap<EntityId, EntityId>,
    emissions: Vec<EmissionRecord>,
    emission_index: HashMap<EmissionKey, usize>,
}

impl Tables {
    /// Snapshot of a stored entity with the rows it is emitted with
    fn entity(&self, kind: EntityKind, id: EntityId) -> Option<DomainEntity> {
        match kind {
            EntityKind::Patient => self.patients.get(&id).cloned().map(DomainEntity::Patient),
            EntityKind::Encounter => self.encounters.get(&id).and_then(|encounter| {
                self.patients
                    .get(&encounter.patient_id)
                    .map(|patient| DomainEntity::Encounter {
                        encounter: encounter.clone(),
                        patient: patient.clone(),
                    })
            }),
            EntityKind::Movement => self
                .movements
                .get(&id)
                .and_then(|encounter_id| self.encounters.get(encounter_id))
                .and_then(|encounter| {
                    let movement = encounter.movements().iter().find(|m| m.id == id)?;
                    let patient = self.patients.get(&encounter.patient_id)?;
                    Some(DomainEntity::Movement {
                        movement: movement.clone(),
                        encounter: encounter.clone(),
                        patient: patient.clone(),
                    })
                }),
        }
    }
}

/// [`Store`] kept in process memory
#[derive(Default)]
pub struct InMemoryStore {
    tables: RwLock<Tables>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for InMemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn ensure_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn record_message(&self, message: &RawMessage) -> Result<()> {
        let mut tables = self.tables.write().await;
        match tables.message_index.get(&message.id).copied() {
            Some(idx) => tables.messages[idx] = message.clone(),
            None => {
                let idx = tables.messages.len();
                tables.messages.push(message.clone());
                tables.message_index.insert(message.id, idx);
            }
        }
        Ok(())
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<RawMessage>> {
        let tables = self.tables.read().await;
        let matching = tables
            .messages
            .iter()
            .rev()
            .filter(|m| query.direction.map_or(true, |d| m.direction == d))
            .cloned();
        Ok(match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn find_patient(&self, identifier: &PatientIdentifier) -> Result<Option<Patient>> {
        let tables = self.tables.read().await;
        Ok(tables
            .patients_by_identifier
            .get(identifier.as_str())
            .and_then(|id| tables.patients.get(id))
            .cloned())
    }

    async fn find_encounter(&self, identifier: &EncounterIdentifier) -> Result<Option<Encounter>> {
        let tables = self.tables.read().await;
        Ok(tables
            .encounters_by_identifier
            .get(identifier.as_str())
            .and_then(|id| tables.encounters.get(id))
            .cloned())
    }

    async fn latest_encounter(&self, patient_id: EntityId) -> Result<Option<Encounter>> {
        let tables = self.tables.read().await;
        Ok(tables
            .encounter_order
            .iter()
            .rev()
            .filter_map(|id| tables.encounters.get(id))
            .find(|e| e.patient_id == patient_id)
            .cloned())
    }

    async fn commit(&self, changes: ChangeSet) -> Result<Vec<DomainEvent>> {
        let mut tables = self.tables.write().await;

        // Stage everything first; the tables are only touched once every
        // change has passed its checks.
        let mut patients: Vec<Patient> = Vec::new();
        let mut encounters: Vec<(Encounter, bool)> = Vec::new();
        let mut movements: Vec<(EntityId, EntityId)> = Vec::new();
        let mut staged: Vec<(EntityKind, EntityId, Option<u64>, u64)> =
            Vec::with_capacity(changes.len());

        for change in changes.changes {
            match change {
                Change::PutPatient {
                    mut patient,
                    expected_version,
                } => {
                    let label = format!("patient/{}", patient.id);
                    let stored = patients
                        .iter()
                        .rev()
                        .find(|p| p.id == patient.id)
                        .or_else(|| tables.patients.get(&patient.id))
                        .map(|p| p.version);
                    let version = next_version(&label, stored, expected_version)?;
                    if expected_version.is_none() {
                        if let Some(owner) =
                            tables.patients_by_identifier.get(patient.identifier.as_str())
                        {
                            if *owner != patient.id {
                                return Err(StoreError::Duplicate(format!(
                                    "patient identifier {}",
                                    patient.identifier
                                ))
                                .into());
                            }
                        }
                    }
                    patient.version = version;
                    staged.push((EntityKind::Patient, patient.id, expected_version, version));
                    patients.push(patient);
                }
                Change::PutEncounter {
                    mut encounter,
                    expected_version,
                } => {
                    let label = format!("encounter/{}", encounter.id);
                    let stored = encounters
                        .iter()
                        .rev()
                        .find(|(e, _)| e.id == encounter.id)
                        .map(|(e, _)| e)
                        .or_else(|| tables.encounters.get(&encounter.id))
                        .map(|e| e.version);
                    let version = next_version(&label, stored, expected_version)?;
                    if expected_version.is_none() {
                        if let Some(owner) =
                            tables.encounters_by_identifier.get(encounter.identifier.as_str())
                        {
                            if *owner != encounter.id {
                                return Err(StoreError::Duplicate(format!(
                                    "encounter identifier {}",
                                    encounter.identifier
                                ))
                                .into());
                            }
                        }
                    }
                    encounter.version = version;
                    staged.push((EntityKind::Encounter, encounter.id, expected_version, version));
                    encounters.push((encounter, expected_version.is_none()));
                }
                Change::InsertMovement { movement } => {
                    if tables.movements.contains_key(&movement.id)
                        || movements.iter().any(|(id, _)| *id == movement.id)
                    {
                        return Err(StoreError::Duplicate(format!("movement/{}", movement.id)).into());
                    }
                    let owner_known = encounters.iter().any(|(e, _)| e.id == movement.encounter_id)
                        || tables.encounters.contains_key(&movement.encounter_id);
                    if !owner_known {
                        return Err(StoreError::NotFound(format!(
                            "encounter/{} of movement/{}",
                            movement.encounter_id, movement.id
                        ))
                        .into());
                    }
                    staged.push((EntityKind::Movement, movement.id, None, movement.version));
                    movements.push((movement.id, movement.encounter_id));
                }
            }
        }

        for patient in patients {
            let previous = tables
                .patients
                .get(&patient.id)
                .map(|p| p.identifier.as_str().to_string());
            if let Some(previous) = previous {
                if previous != patient.identifier.as_str() {
                    tables.patients_by_identifier.remove(&previous);
                }
            }
            tables
                .patients_by_identifier
                .insert(patient.identifier.as_str().to_string(), patient.id);
            tables.patients.insert(patient.id, patient);
        }
        for (encounter, inserted) in encounters {
            if inserted && !tables.encounters.contains_key(&encounter.id) {
                tables.encounter_order.push(encounter.id);
            }
            tables
                .encounters_by_identifier
                .insert(encounter.identifier.as_str().to_string(), encounter.id);
            tables.encounters.insert(encounter.id, encounter);
        }
        for (movement_id, encounter_id) in movements {
            tables.movements.insert(movement_id, encounter_id);
        }

        // Snapshots are taken under the same write lock as the commit
        staged
            .into_iter()
            .map(|(kind, id, expected, version)| {
                tables
                    .entity(kind, id)
                    .map(|entity| DomainEvent::committed(entity, expected, version))
                    .ok_or_else(|| BridgeError::from(StoreError::NotFound(format!("{kind}/{id}"))))
            })
            .collect()
    }


    async fn claim_emission(&self, record: &EmissionRecord) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.emission_index.contains_key(&record.key) {
            return Ok(false);
        }
        let idx = tables.emissions.len();
        tables.emissions.push(record.clone());
        tables.emission_index.insert(record.key.clone(), idx);
        Ok(true)
    }

    async fn complete_emission(&self, key: &EmissionKey, outcome: &EmissionOutcome) -> Result<()> {
        let mut tables = self.tables.write().await;
        let idx = tables
            .emission_index
            .get(key)
            .copied()
            .ok_or_else(|| StoreError::NotFound(format!("emission {key}")))?;
        let record = &mut tables.emissions[idx];
        record.status = outcome.status();
        record.completed_at = Some(Utc::now());
        match outcome {
            EmissionOutcome::Sent { ack_payload } => {
                record.ack_payload = ack_payload.clone();
                record.error = None;
            }
            EmissionOutcome::Failed {
                reason,
                ack_payload,
            } => {
                record.ack_payload = ack_payload.clone();
                record.error = Some(reason.clone());
            }
        }
        Ok(())
    }

    async fn list_emissions(&self, entity_id: Option<EntityId>) -> Result<Vec<EmissionRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .emissions
            .iter()
            .filter(|r| entity_id.map_or(true, |id| r.key.entity_id == id))
            .cloned()
            .collect())
    }
}
