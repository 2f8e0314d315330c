//! Structural layer: relative order of known segments
//!
//! Only segments that are both present and listed in the trigger's order
//! table are compared. The reference position is not moved by a misplaced
//! segment, and all segments misplaced against the same reference collapse
//! into one issue on the last of them, so swapping two segments yields
//! exactly one issue whether or not they are adjacent.

use super::issue::ValidationIssue;
use crate::hl7::{Message, TriggerEvent};

const ADT_A01: &[&str] = &[
    "MSH", "SFT", "EVN", "PID", "PD1", "NK1", "PV1", "PV2", "ZBE", "DB1", "OBX", "AL1", "DG1",
    "DRG", "PR1", "GT1", "IN1", "IN2", "IN3", "ACC", "UB1", "UB2", "PDA",
];

const ADT_A02: &[&str] = &[
    "MSH", "SFT", "EVN", "PID", "PD1", "PV1", "PV2", "ZBE", "DB1", "OBX", "PDA",
];

const ADT_A03: &[&str] = &[
    "MSH", "SFT", "EVN", "PID", "PD1", "PV1", "PV2", "ZBE", "DB1", "AL1", "DG1", "DRG", "PR1",
    "OBX", "GT1", "IN1", "IN2", "IN3", "ACC", "PDA",
];

const ADT_A06: &[&str] = &[
    "MSH", "SFT", "EVN", "PID", "PD1", "MRG", "NK1", "PV1", "PV2", "ZBE", "DB1", "OBX", "AL1",
    "DG1", "DRG", "PR1", "GT1", "IN1", "IN2", "IN3", "ACC", "UB1", "UB2",
];

const ADT_A09: &[&str] = &[
    "MSH", "SFT", "EVN", "PID", "PD1", "PV1", "PV2", "ZBE", "DB1", "OBX", "DG1",
];

const ADT_A21: &[&str] = &[
    "MSH", "SFT", "EVN", "PID", "PD1", "PV1", "PV2", "ZBE", "DB1", "OBX",
];

const ADT_A39: &[&str] = &["MSH", "SFT", "EVN", "PID", "PD1", "MRG", "PV1"];

const ADT_A54: &[&str] = &["MSH", "SFT", "EVN", "PID", "PD1", "PV1", "PV2", "ZBE"];

/// Order table for the trigger's message structure
pub fn order_table(trigger: &TriggerEvent) -> &'static [&'static str] {
    match trigger.structure() {
        "ADT_A02" => ADT_A02,
        "ADT_A03" => ADT_A03,
        "ADT_A06" => ADT_A06,
        "ADT_A09" => ADT_A09,
        "ADT_A21" => ADT_A21,
        "ADT_A39" => ADT_A39,
        "ADT_A54" => ADT_A54,
        _ => ADT_A01,
    }
}

pub fn check(message: &Message, trigger: &TriggerEvent) -> Vec<ValidationIssue> {
    let table = order_table(trigger);
    let mut issues = Vec::new();
    let mut furthest: Option<(usize, &str)> = None;
    // Last segment found below the current reference, with that reference
    let mut misplaced: Option<(&str, &str)> = None;

    for segment in message.segments() {
        let Some(position) = table.iter().position(|name| *name == segment.name()) else {
            continue;
        };
        match furthest {
            Some((max, after)) if position < max => misplaced = Some((segment.name(), after)),
            _ => {
                if let Some((name, after)) = misplaced.take() {
                    issues.push(order_issue(name, after, trigger));
                }
                furthest = Some((position, segment.name()));
            }
        }
    }
    if let Some((name, after)) = misplaced {
        issues.push(order_issue(name, after, trigger));
    }

    issues
}

fn order_issue(name: &str, after: &str, trigger: &TriggerEvent) -> ValidationIssue {
    ValidationIssue::warn(
        format!("{name}_ORDER"),
        name,
        format!("segment {name} must precede {after} in {}", trigger.structure()),
    )
}
