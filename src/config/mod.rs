//! Configuration management for medbridge.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! medbridge uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `MEDBRIDGE_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation of every section and of cross-references between them
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use medbridge::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("medbridge.toml")?;
//!
//! println!("Listening on {}", config.listener.socket_address());
//! for endpoint in config.emission_targets() {
//!     println!("Emitting to {} ({})", endpoint.id, endpoint.peer());
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level and our HL7 sending identity
//! - [`ListenerConfig`] - Inbound MLLP listener
//! - [`EmissionConfig`] - Outbound concurrency, timeouts and queueing
//! - [`StorageConfig`] - Memory or PostgreSQL persistence
//! - `[[endpoints]]` - Upstream/downstream systems
//! - `[[profiles]]` - Site validation profiles
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! [application]
//! sending_application = "MEDBRIDGE"
//! sending_facility = "GENERAL_HOSPITAL"
//!
//! [listener]
//! port = 2575
//!
//! [storage]
//! backend = "postgresql"
//!
//! [storage.postgresql]
//! connection_string = "${MEDBRIDGE_PG_URL}"
//!
//! [[endpoints]]
//! id = "ris"
//! role = "sender"
//! [endpoints.transport]
//! kind = "mllp"
//! host = "ris.hospital.local"
//! port = 2575
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, parse_config};
pub use schema::{
    ApplicationConfig, BridgeConfig, EmissionConfig, ListenerConfig, LoggingConfig,
    PostgreSQLConfig, StorageBackend, StorageConfig,
};
pub use secret::{redact_connection_string, secret_string, SecretString, SecretValue};
