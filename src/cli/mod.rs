//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for medbridge using clap.
//!
//! Exit codes: 0 success, 1 validation failed, 2 configuration error,
//! 4 connection error, 5 fatal error.

pub mod commands;

use clap::{Parser, Subcommand};

/// medbridge - HL7 v2 ADT bridge
#[derive(Parser, Debug)]
#[command(name = "medbridge")]
#[command(version, about, long_about = None)]
#[command(author = "medbridge Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "medbridge.toml", env = "MEDBRIDGE_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "MEDBRIDGE_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the MLLP listener with the full pipeline
    Serve(commands::serve::ServeArgs),

    /// Validate one HL7 v2 message file
    Validate(commands::validate::ValidateArgs),

    /// Validate a multi-message file as one scenario
    Scenario(commands::scenario::ScenarioArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate_config::ValidateConfigArgs),

    /// Initialize a new configuration file
    Init(commands::init::InitArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_serve() {
        let cli = Cli::parse_from(["medbridge", "serve"]);
        assert_eq!(cli.config, "medbridge.toml");
        assert!(matches!(cli.command, Commands::Serve(_)));
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["medbridge", "--config", "custom.toml", "serve"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["medbridge", "--log-level", "debug", "serve"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate() {
        let cli = Cli::parse_from(["medbridge", "validate", "adt.hl7", "--profile", "pam"]);
        match cli.command {
            Commands::Validate(args) => {
                assert_eq!(args.file, "adt.hl7");
                assert_eq!(args.profile.as_deref(), Some("pam"));
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_scenario() {
        let cli = Cli::parse_from(["medbridge", "scenario", "stay.hl7"]);
        assert!(matches!(cli.command, Commands::Scenario(_)));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["medbridge", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_parse_init() {
        let cli = Cli::parse_from(["medbridge", "init"]);
        assert!(matches!(cli.command, Commands::Init(_)));
    }
}
