//! Scenario check: an ordered sequence of messages claimed to belong to one
//! patient and encounter, validated as a unit.
//!
//! - the first trigger must open a scenario (`WORKFLOW_INVALID_INITIAL`);
//!   an invalid opener is skipped and the rest is checked from scratch
//! - every later trigger must be an allowed transition
//!   (`WORKFLOW_INVALID_TRANSITION`); a refused message leaves the state as is
//! - one patient (`SCENARIO_MULTIPLE_PATIENTS`, error), one visit
//!   (`SCENARIO_MULTIPLE_VISITS`, warn) and non-decreasing timestamps
//!   (`SCENARIO_TIMESTAMP_ORDER`, warn)

use super::machine::EncounterWorkflow;
use super::state::EncounterState;
use crate::domain::encounter::PatientClass;
use crate::hl7::{parse_to_utc, Message, TriggerEvent};
use crate::validation::{ValidationIssue, ValidationResult};

/// Outcome of a scenario check
#[derive(Debug, Clone)]
pub struct ScenarioReport {
    pub result: ValidationResult,
    /// State reached after the last accepted message
    pub final_state: EncounterState,
}

fn position(index: usize) -> String {
    format!("message[{}]", index + 1)
}

/// Checks workflow and coherence of a message sequence
pub fn check_scenario(messages: &[Message]) -> ScenarioReport {
    let mut issues = Vec::new();
    let mut workflow = EncounterWorkflow::new();

    for (index, message) in messages.iter().enumerate() {
        let trigger = message
            .trigger()
            .unwrap_or_else(|| TriggerEvent::Other(String::new()));
        let class = message
            .segment("PV1")
            .and_then(|pv1| PatientClass::from_code(pv1.field(2)))
            .unwrap_or_default();

        if index == 0 && !trigger.is_initial() {
            issues.push(ValidationIssue::error(
                "WORKFLOW_INVALID_INITIAL",
                position(index),
                format!("scenario cannot start with trigger '{trigger}'"),
            ));
            continue;
        }

        if let Err(err) = workflow.apply(&trigger, class) {
            issues.push(ValidationIssue::error(
                "WORKFLOW_INVALID_TRANSITION",
                position(index),
                format!("{err} (message {})", index + 1),
            ));
        }
    }

    issues.extend(check_coherence(messages));

    ScenarioReport {
        result: ValidationResult::from_issues(issues),
        final_state: workflow.state(),
    }
}

fn check_coherence(messages: &[Message]) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();
    let mut patient: Option<String> = None;
    let mut visit: Option<String> = None;
    let mut previous_time = None;

    for (index, message) in messages.iter().enumerate() {
        if let Some(id) = message.patient_identifier() {
            match &patient {
                None => patient = Some(id),
                Some(first) if *first != id => issues.push(ValidationIssue::error(
                    "SCENARIO_MULTIPLE_PATIENTS",
                    position(index),
                    format!("patient identifier {id} differs from {first}"),
                )),
                Some(_) => {}
            }
        }

        if let Some(number) = message.visit_number() {
            match &visit {
                None => visit = Some(number),
                Some(first) if *first != number => issues.push(ValidationIssue::warn(
                    "SCENARIO_MULTIPLE_VISITS",
                    position(index),
                    format!("visit number {number} differs from {first}"),
                )),
                Some(_) => {}
            }
        }

        if let Some(at) = message.event_timestamp().and_then(parse_to_utc) {
            if let Some(previous) = previous_time {
                if at < previous {
                    issues.push(ValidationIssue::warn(
                        "SCENARIO_TIMESTAMP_ORDER",
                        position(index),
                        format!("event time {at} precedes the previous message ({previous})"),
                    ));
                }
            }
            previous_time = Some(at);
        }
    }

    issues
}

/// Splits a multi-message file into message texts, one per MSH segment
pub fn split_messages(text: &str) -> Vec<String> {
    let mut messages = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split(['\r', '\n']) {
        let line = line.trim_end();
        if line.trim().is_empty() {
            continue;
        }
        if line.trim_start().starts_with("MSH") && !current.is_empty() {
            messages.push(current.join("\r"));
            current.clear();
        }
        current.push(line);
    }
    if !current.is_empty() {
        messages.push(current.join("\r"));
    }
    messages
}
