//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the medbridge configuration file.

use crate::config::{load_config, redact_connection_string, StorageBackend};
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateConfigArgs {}

impl ValidateConfigArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // Loading runs every section's validation
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration validation failed");
                println!("   Error: {e}");
                println!();
                return Ok(2); // Configuration error exit code
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Log Level: {}", config.application.log_level);
        println!(
            "  Sending Identity: {}^{}",
            config.application.sending_application, config.application.sending_facility
        );
        println!("  Listener: {}", config.listener.socket_address());
        println!(
            "  Default Validation: {} ({:?})",
            config.listener.validation_profile, config.listener.validation_mode
        );

        match config.storage.backend {
            StorageBackend::Memory => println!("  Storage: memory"),
            StorageBackend::PostgreSQL => {
                if let Some(ref pg_config) = config.storage.postgresql {
                    println!("  Storage: PostgreSQL");
                    println!(
                        "  PostgreSQL Connection: {}",
                        redact_connection_string(&pg_config.connection_string)
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
        }

        println!(
            "  Emission: {} concurrent, {}s timeout",
            config.emission.max_concurrency, config.emission.delivery_timeout_seconds
        );
        println!("  Profiles: {}", config.profile_registry().names().join(", "));
        println!("  Endpoints:");
        for endpoint in &config.endpoints {
            println!(
                "    - {} [{:?}{}] {} profile={} mode={:?}",
                endpoint.id,
                endpoint.role,
                if endpoint.enabled { "" } else { ", disabled" },
                endpoint.peer(),
                endpoint.validation_profile,
                endpoint.validation_mode
            );
        }
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[tokio::test]
    async fn test_valid_config_exits_zero() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[application]
sending_application = "MEDBRIDGE"

[[endpoints]]
id = "ris"
role = "sender"
[endpoints.transport]
kind = "mllp"
host = "127.0.0.1"
port = 2576
"#
        )
        .unwrap();

        let code = ValidateConfigArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_exits_two() {
        let mut file = NamedTempFile::new().unwrap();
        writeln!(file, "[emission]\nmax_concurrency = 0").unwrap();

        let code = ValidateConfigArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 2);
    }
}
