//! Validate command implementation
//!
//! This module implements the `validate` command: one HL7 v2 message file is
//! run through the four validation layers and its issues are printed.

use crate::hl7::Message;
use crate::validation::{ValidationLevel, ValidationResult};
use clap::Args;
use std::fs;

/// Arguments for the validate command
#[derive(Args, Debug)]
pub struct ValidateArgs {
    /// Message file (segments separated by CR or LF)
    pub file: String,

    /// Validation profile (defaults to `base`)
    #[arg(short, long)]
    pub profile: Option<String>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

impl ValidateArgs {
    /// Execute the validate command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let text = match fs::read_to_string(&self.file) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("❌ Failed to read {}: {e}", self.file);
                return Ok(5);
            }
        };

        let message = match Message::parse(&text) {
            Ok(m) => m,
            Err(e) => {
                println!("❌ Message cannot be parsed: {e}");
                return Ok(1);
            }
        };

        let profile = self.profile.as_deref().unwrap_or(crate::validation::BASE_PROFILE);
        let engine = super::engine_for(config_path);
        if !engine.profiles().contains(profile) {
            eprintln!(
                "❌ Unknown profile '{profile}'. Available: {}",
                engine.profiles().names().join(", ")
            );
            return Ok(2);
        }

        tracing::info!(file = %self.file, profile, "Validating message");
        let result = engine.validate(&message, profile);

        if self.json {
            println!("{}", serde_json::to_string_pretty(&result)?);
        } else {
            print_result(&message, profile, &result);
        }

        Ok(if result.is_fail() { 1 } else { 0 })
    }
}

fn print_result(message: &Message, profile: &str, result: &ValidationResult) {
    let header = message.header();
    println!(
        "🔍 {} {}^{} (control id {}), profile {}",
        header.sending_application,
        header.message_type,
        header.trigger,
        header.control_id,
        profile
    );
    for issue in &result.issues {
        println!("  {issue}");
    }
    match result.level {
        ValidationLevel::Ok => println!("✅ Level: ok"),
        ValidationLevel::Warn => println!("⚠️  Level: warn ({} issue(s))", result.issues.len()),
        ValidationLevel::Fail => println!("❌ Level: fail ({} issue(s))", result.issues.len()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const ADMIT: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20240101120000||ADT^A01^ADT_A01|MSG1|P|2.5\r\
EVN|A01|20240101120000\r\
PID|||12345^^^HOSP^PI||DOE^JOHN^^^^^L||19800101|M\r\
PV1||I|CARDIO^101^A||||||||||||||||V0001\r";

    fn file_with(text: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(text.as_bytes()).unwrap();
        file
    }

    fn args(file: &NamedTempFile, profile: Option<&str>) -> ValidateArgs {
        ValidateArgs {
            file: file.path().to_string_lossy().to_string(),
            profile: profile.map(str::to_string),
            json: false,
        }
    }

    #[tokio::test]
    async fn test_valid_message_exits_zero() {
        let file = file_with(ADMIT);
        let code = args(&file, None).execute("/nonexistent.toml").await.unwrap();
        assert_eq!(code, 0);
    }

    #[tokio::test]
    async fn test_missing_movement_segment_fails_under_pam() {
        let file = file_with(ADMIT);
        let code = args(&file, Some("pam")).execute("/nonexistent.toml").await.unwrap();
        assert_eq!(code, 1);
    }

    #[tokio::test]
    async fn test_unknown_profile_is_configuration_error() {
        let file = file_with(ADMIT);
        let code = args(&file, Some("nope")).execute("/nonexistent.toml").await.unwrap();
        assert_eq!(code, 2);
    }
}
