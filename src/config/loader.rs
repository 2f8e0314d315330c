//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{BridgeConfig, StorageBackend};
use crate::config::secret_string;
use crate::domain::endpoint::ValidationMode;
use crate::domain::errors::BridgeError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into BridgeConfig
/// 4. Applies environment variable overrides (MEDBRIDGE_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns an error if:
/// - File cannot be read
/// - TOML parsing fails
/// - A referenced environment variable is not set
/// - Configuration validation fails
///
/// # Examples
///
/// ```no_run
/// use medbridge::config::loader::load_config;
///
/// let config = load_config("medbridge.toml").expect("Failed to load config");
/// println!("listening on {}", config.listener.socket_address());
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<BridgeConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(BridgeError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        BridgeError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    parse_config(&contents)
}

/// Parses configuration text, applying substitution, overrides and validation
pub fn parse_config(contents: &str) -> Result<BridgeConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: BridgeConfig = toml::from_str(&contents)
        .map_err(|e| BridgeError::Configuration(format!("Failed to parse TOML: {}", e)))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        BridgeError::Configuration(format!("Configuration validation failed: {}", e))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched.
///
/// # Errors
///
/// Returns an error listing every referenced variable that is not set
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| BridgeError::Configuration(format!("invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let processed = re.replace_all(line, |cap: &regex::Captures<'_>| {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => value,
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                    String::new()
                }
            }
        });
        result.push_str(&processed);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(BridgeError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

/// Applies environment variable overrides using the MEDBRIDGE_* prefix
///
/// Environment variables follow the pattern: MEDBRIDGE_<SECTION>_<KEY>
/// For example: MEDBRIDGE_LISTENER_PORT, MEDBRIDGE_EMISSION_MAX_CONCURRENCY
fn apply_env_overrides(config: &mut BridgeConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_APPLICATION_SENDING_APPLICATION") {
        config.application.sending_application = val;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_APPLICATION_SENDING_FACILITY") {
        config.application.sending_facility = val;
    }

    // Listener overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_LISTENER_BIND_ADDRESS") {
        config.listener.bind_address = val;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_LISTENER_PORT") {
        config.listener.port = parse_override("MEDBRIDGE_LISTENER_PORT", &val)?;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_LISTENER_MAX_FRAME_BYTES") {
        config.listener.max_frame_bytes = parse_override("MEDBRIDGE_LISTENER_MAX_FRAME_BYTES", &val)?;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_LISTENER_VALIDATION_MODE") {
        config.listener.validation_mode = match val.as_str() {
            "warn" => ValidationMode::Warn,
            "reject" => ValidationMode::Reject,
            other => {
                return Err(BridgeError::Configuration(format!(
                    "MEDBRIDGE_LISTENER_VALIDATION_MODE must be 'warn' or 'reject', got '{other}'"
                )))
            }
        };
    }

    // Emission overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_EMISSION_MAX_CONCURRENCY") {
        config.emission.max_concurrency =
            parse_override("MEDBRIDGE_EMISSION_MAX_CONCURRENCY", &val)?;
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_EMISSION_DELIVERY_TIMEOUT_SECONDS") {
        config.emission.delivery_timeout_seconds =
            parse_override("MEDBRIDGE_EMISSION_DELIVERY_TIMEOUT_SECONDS", &val)?;
    }

    // Storage overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_STORAGE_BACKEND") {
        config.storage.backend = match val.as_str() {
            "memory" => StorageBackend::Memory,
            "postgresql" => StorageBackend::PostgreSQL,
            other => {
                return Err(BridgeError::Configuration(format!(
                    "MEDBRIDGE_STORAGE_BACKEND must be 'memory' or 'postgresql', got '{other}'"
                )))
            }
        };
    }
    if let Some(ref mut pg) = config.storage.postgresql {
        if let Ok(val) = std::env::var("MEDBRIDGE_STORAGE_POSTGRESQL_CONNECTION_STRING") {
            pg.connection_string = secret_string(val);
        }
        if let Ok(val) = std::env::var("MEDBRIDGE_STORAGE_POSTGRESQL_MAX_CONNECTIONS") {
            pg.max_connections =
                parse_override("MEDBRIDGE_STORAGE_POSTGRESQL_MAX_CONNECTIONS", &val)?;
        }
    }

    // Logging overrides
    if let Ok(val) = std::env::var("MEDBRIDGE_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = val.parse().unwrap_or(false);
    }
    if let Ok(val) = std::env::var("MEDBRIDGE_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        BridgeError::Configuration(format!("{name} has an invalid value '{value}'"))
    })
}
