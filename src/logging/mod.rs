//! Logging and observability
//!
//! This module provides structured logging with support for:
//! - Human-readable or JSON console output
//! - Configurable log levels
//! - Local JSON file logging with rotation
//!
//! It also exports macros for the events every deployment wants to grep for:
//! received messages, validation issues and emission outcomes.
//!
//! # Example
//!
//! ```no_run
//! use medbridge::logging::init_logging;
//! use medbridge::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! // Use tracing macros for logging
//! tracing::info!("Application started");
//! tracing::error!(error = "Something went wrong", "Error occurred");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, LoggingGuard};

/// Log a received inbound message
///
/// # Example
///
/// ```no_run
/// use medbridge::log_inbound_message;
///
/// log_inbound_message!("his-main", "MSG0001", "A01", 412);
/// ```
#[macro_export]
macro_rules! log_inbound_message {
    ($endpoint:expr, $control_id:expr, $trigger:expr, $bytes:expr) => {
        tracing::info!(
            endpoint_id = %$endpoint,
            control_id = %$control_id,
            trigger = %$trigger,
            bytes = $bytes,
            "Received message"
        );
    };
}

/// Log the outcome of validating a message, one event per issue
///
/// # Example
///
/// ```no_run
/// use medbridge::log_validation_issues;
/// use medbridge::validation::ValidationResult;
///
/// let result = ValidationResult::ok();
/// log_validation_issues!("MSG0001", &result);
/// ```
#[macro_export]
macro_rules! log_validation_issues {
    ($control_id:expr, $result:expr) => {
        for issue in &$result.issues {
            match issue.severity {
                $crate::validation::Severity::Error => tracing::warn!(
                    control_id = %$control_id,
                    code = %issue.code,
                    field = %issue.field,
                    "{}",
                    issue.message
                ),
                _ => tracing::debug!(
                    control_id = %$control_id,
                    code = %issue.code,
                    field = %issue.field,
                    severity = %issue.severity,
                    "{}",
                    issue.message
                ),
            }
        }
        tracing::info!(
            control_id = %$control_id,
            level = %$result.level,
            issues = $result.issues.len(),
            "Validated message"
        );
    };
}

/// Log the final outcome of one emission
///
/// # Example
///
/// ```no_run
/// use medbridge::log_emission_outcome;
/// use medbridge::domain::{EmissionKey, EmissionOutcome, EndpointId, EntityId};
///
/// let key = EmissionKey {
///     entity_id: EntityId::new(),
///     version: 1,
///     endpoint_id: EndpointId::new("ris").unwrap(),
/// };
/// let outcome = EmissionOutcome::Sent { ack_payload: None };
/// log_emission_outcome!(&key, "A01", &outcome);
/// ```
#[macro_export]
macro_rules! log_emission_outcome {
    ($key:expr, $trigger:expr, $outcome:expr) => {
        match $outcome {
            $crate::domain::EmissionOutcome::Sent { .. } => tracing::info!(
                entity_id = %$key.entity_id,
                version = $key.version,
                endpoint_id = %$key.endpoint_id,
                trigger = %$trigger,
                status = "sent",
                "Emission delivered"
            ),
            $crate::domain::EmissionOutcome::Failed { reason, .. } => tracing::warn!(
                entity_id = %$key.entity_id,
                version = $key.version,
                endpoint_id = %$key.endpoint_id,
                trigger = %$trigger,
                status = "error",
                reason = %reason,
                "Emission failed"
            ),
        }
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use medbridge::log_error_with_context;
/// use medbridge::domain::BridgeError;
///
/// let error = BridgeError::Configuration("Invalid config".to_string());
/// log_error_with_context!(&error, "Failed to load configuration");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        );
    };
}
