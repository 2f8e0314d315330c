//! CLI command implementations
//!
//! This module contains all CLI command implementations.

pub mod init;
pub mod scenario;
pub mod serve;
pub mod validate;
pub mod validate_config;

use crate::config::load_config;
use crate::validation::ValidationEngine;

/// Engine with the built-in profiles plus those of the configuration file,
/// when it loads
pub(crate) fn engine_for(config_path: &str) -> ValidationEngine {
    match load_config(config_path) {
        Ok(config) => ValidationEngine::new(config.profile_registry()),
        Err(e) => {
            tracing::debug!(error = %e, "Using built-in validation profiles only");
            ValidationEngine::default()
        }
    }
}
