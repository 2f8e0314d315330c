//! Init command implementation
//!
//! This module implements the `init` command for generating a sample
//! configuration file.

use clap::Args;
use std::fs;
use std::path::Path;

/// Arguments for the init command
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Path where to create the configuration file
    #[arg(short, long, default_value = "medbridge.toml")]
    pub output: String,

    /// Include example values and comments
    #[arg(long)]
    pub with_examples: bool,

    /// Overwrite existing file
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    /// Execute the init command
    pub async fn execute(&self) -> anyhow::Result<i32> {
        tracing::info!(output = %self.output, "Initializing configuration file");

        println!("📝 Initializing medbridge configuration");
        println!();

        if Path::new(&self.output).exists() && !self.force {
            println!("❌ Configuration file already exists: {}", self.output);
            println!("   Use --force to overwrite");
            return Ok(2); // Configuration error exit code
        }

        let config_content = if self.with_examples {
            Self::generate_config_with_examples()
        } else {
            Self::generate_minimal_config()
        };

        match fs::write(&self.output, config_content) {
            Ok(_) => {
                println!("✅ Configuration file created: {}", self.output);
                println!();
                println!("Next steps:");
                println!("  1. Edit {} with your endpoints", self.output);
                println!("  2. For PostgreSQL storage, set MEDBRIDGE_PG_URL in a .env file");
                println!("  3. Validate configuration: medbridge validate-config");
                println!("  4. Start the bridge: medbridge serve");
                println!();
                Ok(0)
            }
            Err(e) => {
                println!("❌ Failed to write configuration file");
                println!("   Error: {}", e);
                Ok(5) // Fatal error exit code
            }
        }
    }

    /// Generate minimal configuration
    fn generate_minimal_config() -> String {
        r#"# medbridge Configuration File
# HL7 v2 ADT bridge

[application]
log_level = "info"
sending_application = "MEDBRIDGE"
sending_facility = "HOSPITAL"

[listener]
bind_address = "0.0.0.0"
port = 2575
validation_profile = "base"
validation_mode = "warn"

[emission]
max_concurrency = 4
delivery_timeout_seconds = 30

[storage]
backend = "memory"

[[endpoints]]
id = "his"
name = "HIS"
role = "receiver"
validation_profile = "pam"
validation_mode = "reject"
[endpoints.transport]
kind = "mllp"
host = "his.hospital.local"
port = 2575

[[endpoints]]
id = "ris"
role = "sender"
[endpoints.transport]
kind = "mllp"
host = "ris.hospital.local"
port = 2575

[logging]
local_enabled = false
local_path = "/var/log/medbridge"
local_rotation = "daily"
"#
        .to_string()
    }

    /// Generate configuration with examples and comments
    fn generate_config_with_examples() -> String {
        r#"# medbridge Configuration File
# HL7 v2 ADT bridge
#
# This file contains all configuration options with examples and explanations.
# Values of the form ${VAR} are read from the environment (or a .env file).
# Any key can be overridden with MEDBRIDGE_<SECTION>_<KEY>.

# ============================================================================
# Application Settings
# ============================================================================
[application]
# Log level (trace, debug, info, warn, error)
log_level = "info"

# MSH-3 / MSH-4 of every message we emit and acknowledge. Inbound messages
# carrying this identity are treated as echoes of our own emissions.
sending_application = "MEDBRIDGE"
sending_facility = "HOSPITAL"

# ============================================================================
# Inbound Listener
# ============================================================================
[listener]
bind_address = "0.0.0.0"
port = 2575

# Largest accepted frame in bytes; larger frames are answered with AR
max_frame_bytes = 1048576

# Close connections idle for longer than this (0 disables)
idle_timeout_seconds = 300

# Policy for senders that match no configured endpoint
validation_profile = "base"
validation_mode = "warn"  # warn | reject

# ============================================================================
# Emission
# ============================================================================
[emission]
# Deliveries in flight across all endpoints (1-64)
max_concurrency = 4

# A delivery not acknowledged within this time is recorded as an error
delivery_timeout_seconds = 30

# Deliveries waiting per endpoint before dispatch waits
queue_capacity = 256

# ============================================================================
# Storage
# ============================================================================
[storage]
backend = "memory"  # memory | postgresql

# [storage.postgresql]
# connection_string = "${MEDBRIDGE_PG_URL}"
# max_connections = 10
# connection_timeout_seconds = 30
# statement_timeout_seconds = 60

# ============================================================================
# Endpoints
# ============================================================================
# role: receiver (we receive from it), sender (we emit to it) or both.
# Inbound messages are matched to an endpoint by MSH-3 against id or name.

[[endpoints]]
id = "his"
name = "HIS"
role = "receiver"
validation_profile = "pam"
validation_mode = "reject"
[endpoints.transport]
kind = "mllp"
host = "his.hospital.local"
port = 2575

[[endpoints]]
id = "ris"
name = "RIS"
role = "sender"
# Entity kinds emitted to this endpoint (patient, encounter, movement);
# omit for all
scope = ["patient", "movement"]
timeout_seconds = 10
[endpoints.transport]
kind = "mllp"
host = "ris.hospital.local"
port = 2575

[[endpoints]]
id = "fhir"
role = "sender"
enabled = false
[endpoints.transport]
kind = "fhir_http"
base_url = "https://fhir.hospital.local/fhir"

# A system that relays our own emissions back to us
# [[endpoints]]
# id = "relay"
# role = "both"
# loopback = true
# [endpoints.transport]
# kind = "mllp"
# host = "relay.hospital.local"
# port = 2575

# ============================================================================
# Site Validation Profiles
# ============================================================================
# Built-in: "base" (no site rules) and "pam" (ZBE required for movements).
# triggers: codes such as "A01", or "movement", "identity", "*".

[[profiles]]
name = "site"

[[profiles.rules]]
triggers = ["movement"]
required_segments = ["PV1", "ZBE"]

[[profiles.rules]]
triggers = ["identity"]
forbidden_segments = ["ZBE"]

# ============================================================================
# Logging
# ============================================================================
[logging]
# Write JSON log files in addition to the console
local_enabled = false
local_path = "/var/log/medbridge"
local_rotation = "daily"  # daily | hourly | never

# Emit JSON lines on the console
json_console = false
"#
        .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::parse_config;
    use tempfile::TempDir;

    #[test]
    fn test_generated_configs_parse() {
        let minimal = parse_config(&InitArgs::generate_minimal_config()).unwrap();
        assert_eq!(minimal.endpoints.len(), 2);

        let full = parse_config(&InitArgs::generate_config_with_examples()).unwrap();
        assert_eq!(full.emission_targets().count(), 1);
        assert!(full.profile_registry().contains("site"));
    }

    #[tokio::test]
    async fn test_init_refuses_to_overwrite() {
        let dir = TempDir::new().unwrap();
        let output = dir.path().join("medbridge.toml");
        let args = InitArgs {
            output: output.to_string_lossy().to_string(),
            with_examples: false,
            force: false,
        };
        assert_eq!(args.execute().await.unwrap(), 0);
        assert_eq!(args.execute().await.unwrap(), 2);
    }
}
