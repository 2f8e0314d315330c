//! Store factory
//!
//! This module provides the factory function that creates the configured
//! storage backend.

use crate::adapters::database::traits::Store;
use crate::adapters::memory::InMemoryStore;
use crate::adapters::postgresql::{PostgreSQLClient, PostgresStore};
use crate::config::schema::{BridgeConfig, StorageBackend};
use crate::domain::{BridgeError, Result};
use std::sync::Arc;

/// Create a store based on the configuration
///
/// For PostgreSQL the schema is created when missing, so the returned store
/// is ready for use.
///
/// # Errors
///
/// Returns an error if the backend section is missing or the database is
/// unreachable.
pub async fn create_store(config: &BridgeConfig) -> Result<Arc<dyn Store>> {
    match config.storage.backend {
        StorageBackend::Memory => {
            tracing::info!("Creating in-memory store");
            Ok(Arc::new(InMemoryStore::new()) as Arc<dyn Store>)
        }
        StorageBackend::PostgreSQL => {
            let pg_config = config.storage.postgresql.as_ref().ok_or_else(|| {
                BridgeError::Configuration(
                    "storage.postgresql configuration is required when backend = 'postgresql'"
                        .to_string(),
                )
            })?;

            let client = PostgreSQLClient::new(pg_config)?;
            tracing::info!(
                database = %client.connection_string_safe(),
                "Creating PostgreSQL store"
            );
            let store = PostgresStore::new(client);
            store.test_connection().await?;
            store.ensure_schema().await?;

            Ok(Arc::new(store) as Arc<dyn Store>)
        }
    }
}
