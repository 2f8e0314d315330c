//! Scenario command implementation
//!
//! This module implements the `scenario` command: a file holding several
//! messages is checked as one patient stay. Each message is validated on its
//! own, then the sequence is checked for workflow and coherence.

use crate::hl7::Message;
use crate::validation::{ValidationLevel, BASE_PROFILE};
use crate::workflow::{check_scenario, split_messages};
use clap::Args;
use std::fs;

/// Arguments for the scenario command
#[derive(Args, Debug)]
pub struct ScenarioArgs {
    /// File with the messages of the scenario, in order
    pub file: String,

    /// Validation profile applied to each message
    #[arg(short, long, default_value = BASE_PROFILE)]
    pub profile: String,
}

impl ScenarioArgs {
    /// Execute the scenario command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let text = match fs::read_to_string(&self.file) {
            Ok(t) => t,
            Err(e) => {
                eprintln!("❌ Failed to read {}: {e}", self.file);
                return Ok(5);
            }
        };

        let texts = split_messages(&text);
        if texts.is_empty() {
            println!("❌ No messages found in {}", self.file);
            return Ok(1);
        }

        let mut messages = Vec::with_capacity(texts.len());
        for (index, text) in texts.iter().enumerate() {
            match Message::parse(text) {
                Ok(m) => messages.push(m),
                Err(e) => {
                    println!("❌ Message {} cannot be parsed: {e}", index + 1);
                    return Ok(1);
                }
            }
        }

        tracing::info!(file = %self.file, messages = messages.len(), "Checking scenario");
        let engine = super::engine_for(config_path);

        println!("🔍 Scenario of {} message(s)", messages.len());
        for (index, message) in messages.iter().enumerate() {
            let result = engine.validate(message, &self.profile);
            println!(
                "  [{}] {} {}: {}",
                index + 1,
                message.trigger().map(|t| t.to_string()).unwrap_or_default(),
                message.control_id(),
                result.level
            );
        }

        let report = check_scenario(&messages);
        println!();
        for issue in &report.result.issues {
            println!("  {issue}");
        }
        println!("  Final state: {}", report.final_state.as_str());

        match report.result.level {
            ValidationLevel::Ok => println!("✅ Scenario: ok"),
            ValidationLevel::Warn => println!("⚠️  Scenario: warn"),
            ValidationLevel::Fail => println!("❌ Scenario: fail"),
        }
        Ok(if report.result.is_fail() { 1 } else { 0 })
    }
}
