//! PostgreSQL implementation of the [`Store`] trait

use crate::adapters::database::traits::{next_version, MessageQuery, Store};
use crate::adapters::postgresql::client::{backend_error, PostgreSQLClient};
use crate::adapters::postgresql::models::{body_from_row, emission_from_row, to_db_version};
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
use std::sync::Arc;

/// [`Store`] backed by PostgreSQL
///
/// A change set runs in one transaction. Updates are conditional on the
/// expected version; a mismatch rolls the whole transaction back.
pub struct PostgresStore {
    client: Arc<PostgreSQLClient>,
}

impl PostgresStore {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value> {
    serde_json::to_value(value).map_err(BridgeError::from)
}

#[async_trait]
impl Store for PostgresStore {
    fn backend_name(&self) -> &'static str {
        "postgresql"
    }

    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn ensure_schema(&self) -> Result<()> {
        self.client.ensure_schema().await
    }

    async fn record_message(&self, message: &RawMessage) -> Result<()> {
        let client = self.client.get_connection().await?;
        let body = to_json(message)?;
        let endpoint = message.endpoint_id.as_ref().map(|e| e.as_str());
        let fate = message.fate.map(|f| f.as_str());

        client
            .execute(
                r#"
                INSERT INTO raw_messages (
                    id, direction, kind, endpoint_id, control_id, trigger_event,
                    fate, created_at, body
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
                ON CONFLICT (id) DO UPDATE SET
                    fate = EXCLUDED.fate,
                    body = EXCLUDED.body
                "#,
                &[
                    &message.id,
                    &message.direction.as_str(),
                    &message.kind.as_str(),
                    &endpoint,
                    &message.control_id,
                    &message.trigger,
                    &fate,
                    &message.created_at,
                    &body,
                ],
            )
            .await
            .map_err(|e| backend_error("record message", e))?;
        Ok(())
    }

    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<RawMessage>> {
        let client = self.client.get_connection().await?;
        let direction = query.direction.map(|d| d.as_str());
        let limit = query.limit.map(|l| l as i64);

        let rows = client
            .query(
                r#"
                SELECT body FROM raw_messages
                WHERE ($1::TEXT IS NULL OR direction = $1)
                ORDER BY created_at DESC
                LIMIT $2
                "#,
                &[&direction, &limit],
            )
            .await
            .map_err(|e| backend_error("list messages", e))?;

        rows.iter()
            .map(|row| body_from_row(row).map_err(BridgeError::from))
            .collect()
    }

    async fn find_patient(&self, identifier: &PatientIdentifier) -> Result<Option<Patient>> {
        let client = self.client.get_connection().await?;
        let row = client
            .query_opt(
                "SELECT body FROM patients WHERE identifier = $1",
                &[&identifier.as_str()],
            )
            .await
            .map_err(|e| backend_error("find patient", e))?;
        Ok(row.as_ref().map(body_from_row).transpose()?)
    }

    async fn find_encounter(&self, identifier: &EncounterIdentifier) -> Result<Option<Encounter>> {
        let client = self.client.get_connection().await?;
        let row = client
            .query_opt(
                "SELECT body FROM encounters WHERE identifier = $1",
                &[&identifier.as_str()],
            )
            .await
            .map_err(|e| backend_error("find encounter", e))?;
        Ok(row.as_ref().map(body_from_row).transpose()?)
    }

    async fn latest_encounter(&self, patient_id: EntityId) -> Result<Option<Encounter>> {
        let client = self.client.get_connection().await?;
        let row = client
            .query_opt(
                r#"
                SELECT body FROM encounters
                WHERE patient_id = $1
                ORDER BY created_at DESC
                LIMIT 1
                "#,
                &[patient_id.as_uuid()],
            )
            .await
            .map_err(|e| backend_error("latest encounter", e))?;
        Ok(row.as_ref().map(body_from_row).transpose()?)
    }

    async fn commit(&self, changes: ChangeSet) -> Result<Vec<DomainEvent>> {
        let mut conn = self.client.get_connection().await?;
        let client: &mut tokio_postgres::Client = &mut conn;
        let tx = client
            .transaction()
            .await
            .map_err(|e| backend_error("begin transaction", e))?;
        let mut staged: Vec<(EntityKind, EntityId, Option<u64>, u64)> =
            Vec::with_capacity(changes.len());

        // Returning early drops `tx`, which rolls the transaction back.
        for change in changes.changes {
            match change {
                Change::PutPatient {
                    mut patient,
                    expected_version,
                } => {
                    let label = format!("patient/{}", patient.id);
                    let version = match expected_version {
                        None => {
                            patient.version = next_version(&label, None, None)?;
                            tx.execute(
                                "INSERT INTO patients (id, identifier, version, body) VALUES ($1, $2, $3, $4)",
                                &[
                                    patient.id.as_uuid(),
                                    &patient.identifier.as_str(),
                                    &to_db_version(patient.version),
                                    &to_json(&patient)?,
                                ],
                            )
                            .await
                            .map_err(|e| backend_error(&label, e))?;
                            patient.version
                        }
                        Some(expected) => {
                            patient.version = expected + 1;
                            let updated = tx
                                .execute(
                                    r#"
                                    UPDATE patients
                                    SET identifier = $5, version = $2, body = $3, updated_at = now()
                                    WHERE id = $1 AND version = $4
                                    "#,
                                    &[
                                        patient.id.as_uuid(),
                                        &to_db_version(patient.version),
                                        &to_json(&patient)?,
                                        &to_db_version(expected),
                                        &patient.identifier.as_str(),
                                    ],
                                )
                                .await
                                .map_err(|e| backend_error(&label, e))?;
                            if updated == 0 {
                                let stored = stored_version(&tx, "patients", patient.id).await?;
                                next_version(&label, stored, Some(expected))?;
                            }
                            patient.version
                        }
                    };
                    staged.push((EntityKind::Patient, patient.id, expected_version, version));
                }
                Change::PutEncounter {
                    mut encounter,
                    expected_version,
                } => {
                    let label = format!("encounter/{}", encounter.id);
                    let version = match expected_version {
                        None => {
                            encounter.version = next_version(&label, None, None)?;
                            tx.execute(
                                r#"
                                INSERT INTO encounters (id, identifier, patient_id, version, body)
                                VALUES ($1, $2, $3, $4, $5)
                                "#,
                                &[
                                    encounter.id.as_uuid(),
                                    &encounter.identifier.as_str(),
                                    encounter.patient_id.as_uuid(),
                                    &to_db_version(encounter.version),
                                    &to_json(&encounter)?,
                                ],
                            )
                            .await
                            .map_err(|e| backend_error(&label, e))?;
                            encounter.version
                        }
                        Some(expected) => {
                            encounter.version = expected + 1;
                            let updated = tx
                                .execute(
                                    r#"
                                    UPDATE encounters SET version = $2, body = $3, updated_at = now()
                                    WHERE id = $1 AND version = $4
                                    "#,
                                    &[
                                        encounter.id.as_uuid(),
                                        &to_db_version(encounter.version),
                                        &to_json(&encounter)?,
                                        &to_db_version(expected),
                                    ],
                                )
                                .await
                                .map_err(|e| backend_error(&label, e))?;
                            if updated == 0 {
                                let stored = stored_version(&tx, "encounters", encounter.id).await?;
                                next_version(&label, stored, Some(expected))?;
                            }
                            encounter.version
                        }
                    };
                    staged.push((EntityKind::Encounter, encounter.id, expected_version, version));
                }
                Change::InsertMovement { movement } => {
                    let label = format!("movement/{}", movement.id);
                    tx.execute(
                        r#"
                        INSERT INTO movements (id, encounter_id, sequence, trigger_event, occurred_at, body)
                        VALUES ($1, $2, $3, $4, $5, $6)
                        "#,
                        &[
                            movement.id.as_uuid(),
                            movement.encounter_id.as_uuid(),
                            &(movement.sequence as i32),
                            &movement.trigger.code(),
                            &movement.occurred_at,
                            &to_json(&movement)?,
                        ],
                    )
                    .await
                    .map_err(|e| backend_error(&label, e))?;
                    staged.push((EntityKind::Movement, movement.id, None, movement.version));
                }
            }
        }

        // Snapshots read inside the transaction see exactly what it wrote
        let mut events = Vec::with_capacity(staged.len());
        for (kind, id, expected, version) in staged {
            let entity = entity_in(&tx, kind, id)
                .await?
                .ok_or_else(|| StoreError::NotFound(format!("{kind}/{id}")))?;
            events.push(DomainEvent::committed(entity, expected, version));
        }

        tx.commit()
            .await
            .map_err(|e| backend_error("commit transaction", e))?;
        Ok(events)
    }

    async fn claim_emission(&self, record: &EmissionRecord) -> Result<bool> {
        let client = self.client.get_connection().await?;
        let inserted = client
            .execute(
                r#"
                INSERT INTO emission_records (
                    id, source_entity_id, source_entity_version, endpoint_id,
                    entity_kind, trigger_event, status, created_at
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                ON CONFLICT (source_entity_id, source_entity_version, endpoint_id) DO NOTHING
                "#,
                &[
                    &record.id,
                    record.key.entity_id.as_uuid(),
                    &to_db_version(record.key.version),
                    &record.key.endpoint_id.as_str(),
                    &record.entity_kind.as_str(),
                    &record.trigger,
                    &record.status.as_str(),
                    &record.created_at,
                ],
            )
            .await
            .map_err(|e| backend_error("claim emission", e))?;
        Ok(inserted == 1)
    }

    async fn complete_emission(&self, key: &EmissionKey, outcome: &EmissionOutcome) -> Result<()> {
        let client = self.client.get_connection().await?;
        let (ack_payload, error) = match outcome {
            EmissionOutcome::Sent { ack_payload } => (ack_payload.clone(), None),
            EmissionOutcome::Failed {
                reason,
                ack_payload,
            } => (ack_payload.clone(), Some(reason.clone())),
        };
        let updated = client
            .execute(
                r#"
                UPDATE emission_records
                SET status = $4, ack_payload = $5, error = $6, completed_at = $7
                WHERE source_entity_id = $1 AND source_entity_version = $2 AND endpoint_id = $3
                "#,
                &[
                    key.entity_id.as_uuid(),
                    &to_db_version(key.version),
                    &key.endpoint_id.as_str(),
                    &outcome.status().as_str(),
                    &ack_payload,
                    &error,
                    &Utc::now(),
                ],
            )
            .await
            .map_err(|e| backend_error("complete emission", e))?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("emission {key}")).into());
        }
        Ok(())
    }

    async fn list_emissions(&self, entity_id: Option<EntityId>) -> Result<Vec<EmissionRecord>> {
        let client = self.client.get_connection().await?;
        let entity = entity_id.map(|id| *id.as_uuid());
        let rows = client
            .query(
                r#"
                SELECT * FROM emission_records
                WHERE ($1::UUID IS NULL OR source_entity_id = $1)
                ORDER BY created_at
                "#,
                &[&entity],
            )
            .await
            .map_err(|e| backend_error("list emissions", e))?;
        rows.iter()
            .map(|row| emission_from_row(row).map_err(BridgeError::from))
            .collect()
    }
}

async fn stored_version(
    tx: &tokio_postgres::Transaction<'_>,
    table: &str,
    id: EntityId,
) -> Result<Option<u64>> {
    let sql = format!("SELECT version FROM {table} WHERE id = $1");
    let row = tx
        .query_opt(sql.as_str(), &[id.as_uuid()])
        .await
        .map_err(|e| backend_error("read version", e))?;
    Ok(row
        .map(|r| r.try_get::<_, i64>("version"))
        .transpose()
        .map_err(|e| StoreError::Backend(format!("version column: {e}")))?
        .map(|v| v as u64))
}

/// Snapshot of a stored entity with the rows it is emitted with
async fn entity_in<C>(client: &C, kind: EntityKind, id: EntityId) -> Result<Option<DomainEntity>>
where
    C: tokio_postgres::GenericClient + Sync,
{
    let entity = match kind {
        EntityKind::Patient => {
            let row = client
                .query_opt("SELECT body FROM patients WHERE id = $1", &[id.as_uuid()])
                .await
                .map_err(|e| backend_error("load patient", e))?;
            row.as_ref()
                .map(body_from_row::<Patient>)
                .transpose()?
                .map(DomainEntity::Patient)
        }
        EntityKind::Encounter | EntityKind::Movement => {
            let sql = if kind == EntityKind::Encounter {
                r#"
                SELECT e.body AS body, p.body AS patient
                FROM encounters e JOIN patients p ON p.id = e.patient_id
                WHERE e.id = $1
                "#
            } else {
                r#"
                SELECT e.body AS body, p.body AS patient
                FROM movements m
                JOIN encounters e ON e.id = m.encounter_id
                JOIN patients p ON p.id = e.patient_id
                WHERE m.id = $1
                "#
            };
            let row = client
                .query_opt(sql, &[id.as_uuid()])
                .await
                .map_err(|e| backend_error("load entity", e))?;
            match row {
                None => None,
                Some(row) => {
                    let encounter: Encounter = body_from_row(&row)?;
                    let patient_body: serde_json::Value = row
                        .try_get("patient")
                        .map_err(|e| StoreError::Backend(format!("patient body: {e}")))?;
                    let patient: Patient = serde_json::from_value(patient_body)?;
                    if kind == EntityKind::Encounter {
                        Some(DomainEntity::Encounter { encounter, patient })
                    } else {
                        encounter
                            .movements()
                            .iter()
                            .find(|m| m.id == id)
                            .cloned()
                            .map(|movement| DomainEntity::Movement {
                                movement,
                                encounter: encounter.clone(),
                                patient,
                            })
                    }
                }
            }
        }
    };
    Ok(entity)
}

