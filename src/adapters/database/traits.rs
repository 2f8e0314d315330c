//! Persistence boundary
//!
//! This module defines the trait every storage backend implements. The
//! pipeline talks to storage only through [`Store`]: it records every message
//! with its validation result, commits domain changes as one transaction and
//! receives the resulting [`DomainEvent`]s, and claims emission keys before
//! any delivery attempt.

use crate::domain::emission::{EmissionKey, EmissionOutcome, EmissionRecord};
use crate::domain::encounter::Encounter;
use crate::domain::errors::StoreError;
use crate::domain::events::{ChangeSet, DomainEvent};
use crate::domain::ids::{EncounterIdentifier, EntityId, PatientIdentifier};
use crate::domain::message::{Direction, RawMessage};
use crate::domain::patient::Patient;
use crate::domain::Result;
use async_trait::async_trait;

/// Filter for listing stored messages
#[derive(Debug, Clone, Default)]
pub struct MessageQuery {
    pub direction: Option<Direction>,
    /// Most recent first; `None` returns everything
    pub limit: Option<usize>,
}

/// Storage backend trait
#[async_trait]
pub trait Store: Send + Sync {
    /// Backend name for logs (`memory`, `postgresql`)
    fn backend_name(&self) -> &'static str;

    /// Test the storage connection
    ///
    /// # Errors
    ///
    /// Returns an error if the backend is unreachable.
    async fn test_connection(&self) -> Result<()>;

    /// Create tables and indexes if they do not exist
    async fn ensure_schema(&self) -> Result<()>;

    /// Persist a raw message together with its validation result and fate.
    ///
    /// Recording the same message id again replaces the earlier row; this
    /// is how a message's fate is filled in once processing finishes.
    async fn record_message(&self, message: &RawMessage) -> Result<()>;

    /// List stored messages, most recent first
    async fn list_messages(&self, query: &MessageQuery) -> Result<Vec<RawMessage>>;

    /// Find a patient by its primary business identifier
    async fn find_patient(&self, identifier: &PatientIdentifier) -> Result<Option<Patient>>;

    /// Find an encounter (with its movements) by visit number
    async fn find_encounter(&self, identifier: &EncounterIdentifier) -> Result<Option<Encounter>>;

    /// Most recently created encounter of a patient
    async fn latest_encounter(&self, patient_id: EntityId) -> Result<Option<Encounter>>;

    /// Commit every change of the set atomically.
    ///
    /// Returns one event per committed mutation, in change order. Each event
    /// carries the entity as this commit wrote it, so later commits never
    /// leak into it.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::VersionConflict` when an update's expected version
    /// does not match the stored one; nothing of the set is written then.
    async fn commit(&self, changes: ChangeSet) -> Result<Vec<DomainEvent>>;

    /// Atomically insert an emission record in status `generated`.
    ///
    /// Returns `false`, writing nothing, when a record with the same key
    /// already exists.
    async fn claim_emission(&self, record: &EmissionRecord) -> Result<bool>;

    /// Record the final outcome of a claimed emission
    async fn complete_emission(&self, key: &EmissionKey, outcome: &EmissionOutcome) -> Result<()>;

    /// Emission records, optionally restricted to one source entity
    async fn list_emissions(&self, entity_id: Option<EntityId>) -> Result<Vec<EmissionRecord>>;
}

/// Version written by a put, given the stored version and the version the
/// caller expects to replace (`None` for an insert)
pub fn next_version(
    entity: &str,
    stored: Option<u64>,
    expected: Option<u64>,
) -> std::result::Result<u64, StoreError> {
    match (stored, expected) {
        (None, None) => Ok(1),
        (Some(_), None) => Err(StoreError::Duplicate(entity.to_string())),
        (None, Some(_)) => Err(StoreError::NotFound(entity.to_string())),
        (Some(found), Some(expected)) if found == expected => Ok(found + 1),
        (Some(found), Some(expected)) => Err(StoreError::VersionConflict {
            entity: entity.to_string(),
            expected,
            found,
        }),
    }
}
