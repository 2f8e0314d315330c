//! Row mapping for the PostgreSQL store
//!
//! Entities and raw messages are stored as JSONB bodies next to the columns
//! used for lookups and constraints. Emission records are stored as plain
//! columns so that operators can query them directly.

use crate::domain::emission::{EmissionKey, EmissionRecord, EmissionStatus};
use crate::domain::errors::StoreError;
use crate::domain::events::EntityKind;
use crate::domain::ids::{EndpointId, EntityId};
use serde::de::DeserializeOwned;
use tokio_postgres::Row;

/// Deserializes the `body` column of a row
pub fn body_from_row<T: DeserializeOwned>(row: &Row) -> Result<T, StoreError> {
    let body: serde_json::Value = row
        .try_get("body")
        .map_err(|e| StoreError::Backend(format!("missing body column: {e}")))?;
    serde_json::from_value(body)
        .map_err(|e| StoreError::Backend(format!("corrupt entity body: {e}")))
}

/// Builds an emission record from an `emission_records` row
pub fn emission_from_row(row: &Row) -> Result<EmissionRecord, StoreError> {
    let column = |e: tokio_postgres::Error| StoreError::Backend(format!("emission row: {e}"));

    let endpoint: String = row.try_get("endpoint_id").map_err(column)?;
    let kind: String = row.try_get("entity_kind").map_err(column)?;
    let status: String = row.try_get("status").map_err(column)?;
    let version: i64 = row.try_get("source_entity_version").map_err(column)?;

    Ok(EmissionRecord {
        id: row.try_get("id").map_err(column)?,
        key: EmissionKey {
            entity_id: EntityId::from(row.try_get::<_, uuid::Uuid>("source_entity_id").map_err(column)?),
            version: version as u64,
            endpoint_id: EndpointId::new(endpoint).map_err(StoreError::Backend)?,
        },
        entity_kind: EntityKind::parse(&kind)
            .ok_or_else(|| StoreError::Backend(format!("unknown entity kind '{kind}'")))?,
        trigger: row.try_get("trigger_event").map_err(column)?,
        status: EmissionStatus::parse(&status)
            .ok_or_else(|| StoreError::Backend(format!("unknown emission status '{status}'")))?,
        ack_payload: row.try_get("ack_payload").map_err(column)?,
        error: row.try_get("error").map_err(column)?,
        created_at: row.try_get("created_at").map_err(column)?,
        completed_at: row.try_get("completed_at").map_err(column)?,
    })
}

/// Stored versions are BIGINT
pub fn to_db_version(version: u64) -> i64 {
    i64::try_from(version).unwrap_or(i64::MAX)
}
