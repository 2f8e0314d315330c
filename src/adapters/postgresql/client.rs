//! PostgreSQL client implementation
//!
//! This module provides the pooled connection handling used by
//! [`PostgresStore`](super::PostgresStore).

use crate::config::schema::PostgreSQLConfig;
use crate::config::redact_connection_string;
use crate::domain::errors::StoreError;
use crate::domain::{BridgeError, Result};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::error::SqlState;
use tokio_postgres::NoTls;

/// Tables and indexes the store needs
const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS raw_messages (
    id UUID PRIMARY KEY,
    direction TEXT NOT NULL,
    kind TEXT NOT NULL,
    endpoint_id TEXT,
    control_id TEXT,
    trigger_event TEXT,
    fate TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    body JSONB NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_raw_messages_created_at ON raw_messages (created_at DESC);

CREATE TABLE IF NOT EXISTS patients (
    id UUID PRIMARY KEY,
    identifier TEXT NOT NULL UNIQUE,
    version BIGINT NOT NULL,
    body JSONB NOT NULL,
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);

CREATE TABLE IF NOT EXISTS encounters (
    id UUID PRIMARY KEY,
    identifier TEXT NOT NULL UNIQUE,
    patient_id UUID NOT NULL REFERENCES patients (id),
    version BIGINT NOT NULL,
    body JSONB NOT NULL,
    created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
    updated_at TIMESTAMPTZ NOT NULL DEFAULT now()
);
CREATE INDEX IF NOT EXISTS idx_encounters_patient ON encounters (patient_id, created_at DESC);

CREATE TABLE IF NOT EXISTS movements (
    id UUID PRIMARY KEY,
    encounter_id UUID NOT NULL REFERENCES encounters (id),
    sequence INTEGER NOT NULL,
    trigger_event TEXT NOT NULL,
    occurred_at TIMESTAMPTZ NOT NULL,
    body JSONB NOT NULL,
    UNIQUE (encounter_id, sequence)
);

CREATE TABLE IF NOT EXISTS emission_records (
    id UUID PRIMARY KEY,
    source_entity_id UUID NOT NULL,
    source_entity_version BIGINT NOT NULL,
    endpoint_id TEXT NOT NULL,
    entity_kind TEXT NOT NULL,
    trigger_event TEXT,
    status TEXT NOT NULL,
    ack_payload TEXT,
    error TEXT,
    created_at TIMESTAMPTZ NOT NULL,
    completed_at TIMESTAMPTZ,
    UNIQUE (source_entity_id, source_entity_version, endpoint_id)
);
"#;

/// PostgreSQL client for medbridge
///
/// Owns the connection pool. Every pooled connection carries the configured
/// statement timeout.
pub struct PostgreSQLClient {
    pool: Pool,
    safe_connection_string: String,
}

impl PostgreSQLClient {
    /// Create a new PostgreSQL client
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string is invalid or the pool
    /// cannot be built. No connection is opened here.
    pub fn new(config: &PostgreSQLConfig) -> Result<Self> {
        let mut pg_config: tokio_postgres::Config = config
            .connection_string
            .expose_secret()
            .parse()
            .map_err(|e| {
                BridgeError::Configuration(format!("Invalid PostgreSQL connection string: {}", e))
            })?;
        pg_config.options(&format!(
            "-c statement_timeout={}",
            config.statement_timeout_seconds * 1000
        ));
        pg_config.connect_timeout(Duration::from_secs(config.connection_timeout_seconds));

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let timeout = Some(Duration::from_secs(config.connection_timeout_seconds));
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .runtime(deadpool_postgres::Runtime::Tokio1)
            .wait_timeout(timeout)
            .create_timeout(timeout)
            .recycle_timeout(timeout)
            .build()
            .map_err(|e| {
                BridgeError::Connection(format!("Failed to create connection pool: {}", e))
            })?;

        Ok(Self {
            pool,
            safe_connection_string: redact_connection_string(&config.connection_string),
        })
    }

    /// Attempts to get a connection from the pool and run a trivial query
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| BridgeError::Connection(format!("Connection test failed: {}", e)))?;

        tracing::info!(
            database = %self.safe_connection_string,
            "PostgreSQL connection test successful"
        );
        Ok(())
    }

    /// Creates the tables and indexes if they don't exist
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.get_connection().await?;
        client
            .batch_execute(SCHEMA_SQL)
            .await
            .map_err(|e| backend_error("schema initialisation", e))?;

        tracing::info!("PostgreSQL schema initialized successfully");
        Ok(())
    }

    /// Get a connection from the pool
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Object> {
        self.pool.get().await.map_err(|e| {
            BridgeError::Connection(format!("Failed to get connection from pool: {}", e))
        })
    }

    /// Connection string without credentials
    pub fn connection_string_safe(&self) -> &str {
        &self.safe_connection_string
    }

    /// Get the pool statistics
    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}

/// Maps a driver error to a store error, keeping unique violations apart
pub(crate) fn backend_error(context: &str, err: tokio_postgres::Error) -> BridgeError {
    if err.code() == Some(&SqlState::UNIQUE_VIOLATION) {
        return StoreError::Duplicate(format!("{context}: {err}")).into();
    }
    StoreError::Backend(format!("{context}: {err}")).into()
}
