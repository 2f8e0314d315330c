//! Validation engine
//!
//! Runs the four layers in order (profile, structural, base standard,
//! composite datatypes) and aggregates their issues. Layers never perform I/O
//! and never short-circuit each other.

use super::issue::ValidationResult;
use super::profile::{self, ProfileRegistry, ValidationProfile};
use super::{base, datatypes, structural};
use crate::hl7::Message;

/// Validates parsed messages against named profiles
#[derive(Debug, Clone, Default)]
pub struct ValidationEngine {
    profiles: ProfileRegistry,
}

impl ValidationEngine {
    pub fn new(profiles: ProfileRegistry) -> Self {
        Self { profiles }
    }

    pub fn profiles(&self) -> &ProfileRegistry {
        &self.profiles
    }

    /// Validates against a named profile; unknown names fall back to `base`
    pub fn validate(&self, message: &Message, profile_name: &str) -> ValidationResult {
        let fallback;
        let profile = match self.profiles.get(profile_name) {
            Some(profile) => profile,
            None => {
                tracing::warn!(
                    profile = profile_name,
                    "Unknown validation profile, using base rules"
                );
                fallback = ValidationProfile::base();
                &fallback
            }
        };
        validate_with(message, profile)
    }
}

/// Validates a message against one profile
pub fn validate_with(message: &Message, profile: &ValidationProfile) -> ValidationResult {
    let mut issues = Vec::new();

    // Trigger-keyed layers need a trigger; its absence is a base-layer issue
    if let Some(trigger) = message.trigger() {
        issues.extend(profile::check(message, &trigger, profile));
        issues.extend(structural::check(message, &trigger));
    }
    issues.extend(base::check(message));
    issues.extend(datatypes::check(message));

    let result = ValidationResult::from_issues(issues);
    tracing::debug!(
        control_id = message.control_id(),
        profile = %profile.name,
        level = %result.level,
        issues = result.issues.len(),
        "Message validated"
    );
    result
}
