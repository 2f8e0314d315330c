//! Site profiles: per-trigger mandatory and forbidden segments
//!
//! Two profiles are built in. `base` carries no site rules. `pam` makes the
//! movement segment ZBE mandatory for movement triggers and forbids it for
//! identity-only triggers. Further profiles come from `[[profiles]]` in the
//! configuration.

use super::issue::{Severity, ValidationIssue};
use crate::hl7::{Message, TriggerEvent};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

/// Name of the profile without site rules
pub const BASE_PROFILE: &str = "base";

/// Name of the built-in patient-administration-and-movement profile
pub const PAM_PROFILE: &str = "pam";

/// One rule of a profile
///
/// `triggers` holds trigger codes (`A01`) or the selectors `movement`,
/// `identity` and `*`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRule {
    pub triggers: Vec<String>,

    #[serde(default)]
    pub required_segments: Vec<String>,

    #[serde(default)]
    pub forbidden_segments: Vec<String>,
}

impl ProfileRule {
    pub fn applies_to(&self, trigger: &TriggerEvent) -> bool {
        self.triggers.iter().any(|selector| match selector.as_str() {
            "*" => true,
            "movement" => trigger.is_movement(),
            "identity" => trigger.is_identity_only(),
            code => code.eq_ignore_ascii_case(trigger.code()),
        })
    }
}

/// A named set of rules
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationProfile {
    pub name: String,

    #[serde(default)]
    pub rules: Vec<ProfileRule>,
}

impl ValidationProfile {
    pub fn base() -> Self {
        Self {
            name: BASE_PROFILE.to_string(),
            rules: Vec::new(),
        }
    }

    pub fn pam() -> Self {
        let segments = |names: &[&str]| names.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            name: PAM_PROFILE.to_string(),
            rules: vec![
                ProfileRule {
                    triggers: vec!["movement".to_string()],
                    required_segments: segments(&["EVN", "PID", "PV1", "ZBE"]),
                    forbidden_segments: Vec::new(),
                },
                ProfileRule {
                    triggers: vec!["identity".to_string()],
                    required_segments: segments(&["EVN", "PID"]),
                    forbidden_segments: segments(&["ZBE"]),
                },
                ProfileRule {
                    triggers: vec!["A08".to_string()],
                    required_segments: segments(&["EVN", "PID", "PV1"]),
                    forbidden_segments: Vec::new(),
                },
                ProfileRule {
                    triggers: vec!["A40".to_string()],
                    required_segments: segments(&["MRG"]),
                    forbidden_segments: segments(&["PV1"]),
                },
            ],
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("profile name cannot be empty".to_string());
        }
        for rule in &self.rules {
            if rule.triggers.is_empty() {
                return Err(format!("profile {}: rule without triggers", self.name));
            }
            for segment in rule.required_segments.iter().chain(&rule.forbidden_segments) {
                let valid = segment.len() == 3
                    && segment
                        .chars()
                        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
                if !valid {
                    return Err(format!(
                        "profile {}: invalid segment name '{segment}'",
                        self.name
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Profile layer: presence and absence of profile-mandated segments
pub fn check(message: &Message, trigger: &TriggerEvent, profile: &ValidationProfile) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut seen = HashSet::new();

    for rule in profile.rules.iter().filter(|r| r.applies_to(trigger)) {
        for segment in &rule.required_segments {
            if !message.has_segment(segment) && seen.insert(format!("{segment}_MISSING")) {
                issues.push(ValidationIssue::new(
                    format!("{segment}_MISSING"),
                    segment.clone(),
                    Severity::Error,
                    format!(
                        "segment {segment} is mandatory for {trigger} in profile {}",
                        profile.name
                    ),
                ));
            }
        }
        for segment in &rule.forbidden_segments {
            if message.has_segment(segment) && seen.insert(format!("{segment}_FORBIDDEN")) {
                issues.push(ValidationIssue::new(
                    format!("{segment}_FORBIDDEN"),
                    segment.clone(),
                    Severity::Warn,
                    format!(
                        "segment {segment} is not expected for {trigger} in profile {}",
                        profile.name
                    ),
                ));
            }
        }
    }

    issues
}

/// Built-in and configured profiles by name
#[derive(Debug, Clone)]
pub struct ProfileRegistry {
    profiles: BTreeMap<String, ValidationProfile>,
}

impl Default for ProfileRegistry {
    fn default() -> Self {
        let mut profiles = BTreeMap::new();
        for profile in [ValidationProfile::base(), ValidationProfile::pam()] {
            profiles.insert(profile.name.clone(), profile);
        }
        Self { profiles }
    }
}

impl ProfileRegistry {
    /// Built-ins plus custom profiles; a custom profile may replace a built-in
    pub fn with_custom(custom: impl IntoIterator<Item = ValidationProfile>) -> Self {
        let mut registry = Self::default();
        for profile in custom {
            registry.profiles.insert(profile.name.clone(), profile);
        }
        registry
    }

    pub fn get(&self, name: &str) -> Option<&ValidationProfile> {
        self.profiles.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.profiles.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.profiles.keys().map(String::as_str).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MSH: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20240101120000||ADT^A01^ADT_A01|1|P|2.5";

    fn message(segments: &[&str]) -> Message {
        let mut text = String::from(MSH);
        for seg in segments {
            text.push('\r');
            text.push_str(seg);
        }
        Message::parse(&text).unwrap()
    }

    #[test]
    fn test_pam_requires_zbe_for_movements() {
        let msg = message(&["EVN|A01|20240101", "PID|||1", "PV1||I"]);
        let issues = check(&msg, &TriggerEvent::A01, &ValidationProfile::pam());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "ZBE_MISSING");
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_pam_forbids_zbe_for_identity_triggers() {
        let msg = message(&["EVN|A28|20240101", "PID|||1", "ZBE|1|20240101||INSERT"]);
        let issues = check(&msg, &TriggerEvent::A28, &ValidationProfile::pam());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "ZBE_FORBIDDEN");
        assert_eq!(issues[0].severity, Severity::Warn);
    }

    #[test]
    fn test_base_profile_has_no_rules() {
        let msg = message(&[]);
        assert!(check(&msg, &TriggerEvent::A01, &ValidationProfile::base()).is_empty());
    }

    #[test]
    fn test_duplicate_requirements_reported_once() {
        let profile = ValidationProfile {
            name: "site".to_string(),
            rules: vec![
                ProfileRule {
                    triggers: vec!["*".to_string()],
                    required_segments: vec!["PV1".to_string()],
                    forbidden_segments: vec![],
                },
                ProfileRule {
                    triggers: vec!["A01".to_string()],
                    required_segments: vec!["PV1".to_string()],
                    forbidden_segments: vec![],
                },
            ],
        };
        let issues = check(&message(&[]), &TriggerEvent::A01, &profile);
        assert_eq!(issues.len(), 1);
    }

    #[test]
    fn test_registry_custom_profiles() {
        let custom = ValidationProfile {
            name: "radiology".to_string(),
            rules: vec![],
        };
        let registry = ProfileRegistry::with_custom(vec![custom]);
        assert!(registry.contains("base"));
        assert!(registry.contains("pam"));
        assert!(registry.contains("radiology"));
        assert_eq!(registry.names(), vec!["base", "pam", "radiology"]);
    }

    #[test]
    fn test_profile_validation() {
        assert!(ValidationProfile::pam().validate().is_ok());
        let bad = ValidationProfile {
            name: "bad".to_string(),
            rules: vec![ProfileRule {
                triggers: vec!["A01".to_string()],
                required_segments: vec!["pid".to_string()],
                forbidden_segments: vec![],
            }],
        };
        assert!(bad.validate().is_err());
    }
}
