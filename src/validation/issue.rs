//! Validation issues and results
//!
//! Issue codes follow `{SEGMENT}{FIELD}[_{REPETITION}]_{SUBCODE}`; segment-level
//! codes drop the field number (`ZBE_MISSING`). Severity is fixed by the rule
//! that raises the issue.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Issue severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warn,
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warn => "warn",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregated validation level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationLevel {
    Ok,
    Warn,
    Fail,
}

impl ValidationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationLevel::Ok => "ok",
            ValidationLevel::Warn => "warn",
            ValidationLevel::Fail => "fail",
        }
    }
}

impl fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub code: String,
    /// Location, e.g. `PID-3[2].1` or `message[1]`
    pub field: String,
    pub severity: Severity,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        code: impl Into<String>,
        field: impl Into<String>,
        severity: Severity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            field: field.into(),
            severity,
            message: message.into(),
        }
    }

    pub fn error(code: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, field, Severity::Error, message)
    }

    pub fn warn(code: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, field, Severity::Warn, message)
    }

    pub fn info(code: impl Into<String>, field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(code, field, Severity::Info, message)
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}: {}",
            self.severity, self.code, self.field, self.message
        )
    }
}

/// Outcome of validating a message or a scenario
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub level: ValidationLevel,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Builds a result; the level is derived from the worst severity
    pub fn from_issues(issues: Vec<ValidationIssue>) -> Self {
        let level = match issues.iter().map(|i| i.severity).max() {
            Some(Severity::Error) => ValidationLevel::Fail,
            Some(Severity::Warn) => ValidationLevel::Warn,
            _ => ValidationLevel::Ok,
        };
        Self { level, issues }
    }

    pub fn ok() -> Self {
        Self::from_issues(Vec::new())
    }

    pub fn is_fail(&self) -> bool {
        self.level == ValidationLevel::Fail
    }

    /// First error-level issue, in the order the layers raised them
    pub fn first_error(&self) -> Option<&ValidationIssue> {
        self.issues.iter().find(|i| i.severity == Severity::Error)
    }

    pub fn has_code(&self, code: &str) -> bool {
        self.issues.iter().any(|i| i.code == code)
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.issues.iter().filter(|i| i.severity == severity).count()
    }
}

impl Default for ValidationResult {
    fn default() -> Self {
        Self::ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_from_worst_severity() {
        assert_eq!(ValidationResult::ok().level, ValidationLevel::Ok);

        let info = ValidationResult::from_issues(vec![ValidationIssue::info("X_INFO", "X", "i")]);
        assert_eq!(info.level, ValidationLevel::Ok);

        let warn = ValidationResult::from_issues(vec![
            ValidationIssue::info("X_INFO", "X", "i"),
            ValidationIssue::warn("X_WARN", "X", "w"),
        ]);
        assert_eq!(warn.level, ValidationLevel::Warn);

        let fail = ValidationResult::from_issues(vec![
            ValidationIssue::warn("X_WARN", "X", "w"),
            ValidationIssue::error("X_ERR", "X", "e"),
        ]);
        assert_eq!(fail.level, ValidationLevel::Fail);
        assert!(fail.is_fail());
    }

    #[test]
    fn test_first_error_keeps_order() {
        let result = ValidationResult::from_issues(vec![
            ValidationIssue::warn("A_WARN", "A", "w"),
            ValidationIssue::error("B_ERR", "B", "first"),
            ValidationIssue::error("C_ERR", "C", "second"),
        ]);
        assert_eq!(result.first_error().unwrap().code, "B_ERR");
        assert_eq!(result.count(Severity::Error), 2);
        assert!(result.has_code("C_ERR"));
    }

    #[test]
    fn test_display_issue() {
        let issue = ValidationIssue::error("PID3_EMPTY", "PID-3", "identifier list is empty");
        assert_eq!(
            issue.to_string(),
            "[error] PID3_EMPTY PID-3: identifier list is empty"
        );
    }
}
