//! Base-standard layer: required fields, coded value sets and cross-field
//! coherence on the header, event, identification, visit and movement
//! segments. Absent segments are skipped; their absence is the profile
//! layer's concern.

use super::issue::ValidationIssue;
use crate::domain::encounter::PatientClass;
use crate::hl7::{Message, Segment};

/// HL7 table 0103
const PROCESSING_IDS: &[&str] = &["P", "D", "T"];

/// HL7 table 0001
const ADMINISTRATIVE_SEX: &[&str] = &["F", "M", "O", "U", "A", "N"];

/// ZBE-4 action types
const MOVEMENT_ACTIONS: &[&str] = &["INSERT", "UPDATE", "CANCEL"];

/// ZBE-9 movement natures
const MOVEMENT_NATURES: &[&str] = &["S", "H", "M", "L", "D", "SM"];

pub fn check(message: &Message) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let Some(msh) = message.segment("MSH") {
        check_msh(msh, &mut issues);
    }
    if let Some(evn) = message.segment("EVN") {
        let header_trigger = message
            .segment("MSH")
            .map(|msh| msh.component(9, 2))
            .unwrap_or("");
        check_evn(evn, header_trigger, &mut issues);
    }
    if let Some(pid) = message.segment("PID") {
        check_pid(pid, &mut issues);
    }
    if let Some(pv1) = message.segment("PV1") {
        check_pv1(pv1, &mut issues);
    }
    if let Some(zbe) = message.segment("ZBE") {
        check_zbe(zbe, &mut issues);
    }
    if let Some(mrg) = message.segment("MRG") {
        if mrg.repetitions(1).is_empty() {
            issues.push(ValidationIssue::error(
                "MRG1_EMPTY",
                "MRG-1",
                "prior patient identifier list is empty",
            ));
        }
    }

    issues
}

fn check_msh(msh: &Segment, issues: &mut Vec<ValidationIssue>) {
    if msh.field(7).is_empty() {
        issues.push(ValidationIssue::error(
            "MSH7_EMPTY",
            "MSH-7",
            "message date/time is empty",
        ));
    }

    if msh.component(9, 1).is_empty() || msh.component(9, 2).is_empty() {
        issues.push(ValidationIssue::error(
            "MSH9_EMPTY",
            "MSH-9",
            "message type and trigger event are required",
        ));
    } else if msh.component(9, 1) != "ADT" {
        issues.push(ValidationIssue::error(
            "MSH9_INVALID_VALUE",
            "MSH-9.1",
            format!("message type {} is not ADT", msh.component(9, 1)),
        ));
    }

    if msh.field(10).is_empty() {
        issues.push(ValidationIssue::error(
            "MSH10_EMPTY",
            "MSH-10",
            "message control id is empty",
        ));
    }

    let processing_id = msh.component(11, 1);
    if processing_id.is_empty() {
        issues.push(ValidationIssue::error(
            "MSH11_EMPTY",
            "MSH-11",
            "processing id is empty",
        ));
    } else if !PROCESSING_IDS.contains(&processing_id) {
        issues.push(ValidationIssue::error(
            "MSH11_INVALID_VALUE",
            "MSH-11",
            format!("processing id {processing_id} is not one of P, D, T"),
        ));
    }

    let version = msh.component(12, 1);
    if version.is_empty() {
        issues.push(ValidationIssue::error(
            "MSH12_EMPTY",
            "MSH-12",
            "version id is empty",
        ));
    } else if version != "2.5" && !version.starts_with("2.5.") {
        issues.push(ValidationIssue::warn(
            "MSH12_INVALID_VALUE",
            "MSH-12",
            format!("version {version} differs from 2.5"),
        ));
    }
}

fn check_evn(evn: &Segment, header_trigger: &str, issues: &mut Vec<ValidationIssue>) {
    if evn.field(2).is_empty() {
        issues.push(ValidationIssue::error(
            "EVN2_EMPTY",
            "EVN-2",
            "recorded date/time is empty",
        ));
    }

    let event_code = evn.field(1);
    if !event_code.is_empty() && !header_trigger.is_empty() && event_code != header_trigger {
        issues.push(ValidationIssue::warn(
            "EVN1_MISMATCH",
            "EVN-1",
            format!("event code {event_code} differs from MSH-9.2 {header_trigger}"),
        ));
    }
}

fn check_pid(pid: &Segment, issues: &mut Vec<ValidationIssue>) {
    if pid.repetitions(3).is_empty() {
        issues.push(ValidationIssue::error(
            "PID3_EMPTY",
            "PID-3",
            "patient identifier list is empty",
        ));
    }

    if pid.repetitions(5).is_empty() {
        issues.push(ValidationIssue::error(
            "PID5_EMPTY",
            "PID-5",
            "patient name is empty",
        ));
    }

    let sex = pid.field(8);
    if !sex.is_empty() && !ADMINISTRATIVE_SEX.contains(&sex) {
        issues.push(ValidationIssue::error(
            "PID8_INVALID_VALUE",
            "PID-8",
            format!("administrative sex {sex} is not in table 0001"),
        ));
    }
}

fn check_pv1(pv1: &Segment, issues: &mut Vec<ValidationIssue>) {
    let class = pv1.field(2);
    if class.is_empty() {
        issues.push(ValidationIssue::error(
            "PV12_EMPTY",
            "PV1-2",
            "patient class is empty",
        ));
    } else if PatientClass::from_code(class).is_none() {
        issues.push(ValidationIssue::error(
            "PV12_INVALID_VALUE",
            "PV1-2",
            format!("patient class {class} is not in table 0004"),
        ));
    }
}

fn check_zbe(zbe: &Segment, issues: &mut Vec<ValidationIssue>) {
    if zbe.repetitions(1).is_empty() {
        issues.push(ValidationIssue::error(
            "ZBE1_EMPTY",
            "ZBE-1",
            "movement identifier is empty",
        ));
    }

    if zbe.field(2).is_empty() {
        issues.push(ValidationIssue::error(
            "ZBE2_EMPTY",
            "ZBE-2",
            "movement date/time is empty",
        ));
    }

    let action = zbe.field(4);
    if action.is_empty() {
        issues.push(ValidationIssue::error(
            "ZBE4_EMPTY",
            "ZBE-4",
            "movement action is empty",
        ));
    } else if !MOVEMENT_ACTIONS.contains(&action) {
        issues.push(ValidationIssue::error(
            "ZBE4_INVALID_VALUE",
            "ZBE-4",
            format!("movement action {action} is not INSERT, UPDATE or CANCEL"),
        ));
    }

    let nature = zbe.field(9);
    if !nature.is_empty() && !MOVEMENT_NATURES.contains(&nature) {
        issues.push(ValidationIssue::warn(
            "ZBE9_INVALID_VALUE",
            "ZBE-9",
            format!("movement nature {nature} is not a known nature"),
        ));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::issue::Severity;

    fn codes(text: &str) -> Vec<String> {
        let msg = Message::parse(text).unwrap();
        check(&msg).into_iter().map(|i| i.code).collect()
    }

    const MSH: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20240101120000||ADT^A01^ADT_A01|MSG1|P|2.5";

    #[test]
    fn test_valid_header_has_no_issue() {
        assert!(codes(MSH).is_empty());
    }

    #[test]
    fn test_header_required_fields() {
        let found = codes("MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|||||X|2.4");
        assert_eq!(
            found,
            vec![
                "MSH7_EMPTY",
                "MSH9_EMPTY",
                "MSH10_EMPTY",
                "MSH11_INVALID_VALUE",
                "MSH12_INVALID_VALUE"
            ]
        );
    }

    #[test]
    fn test_empty_patient_identifier() {
        let text = format!("{MSH}\rEVN|A01|20240101\rPID|||||DOE^JOHN");
        let msg = Message::parse(&text).unwrap();
        let issues = check(&msg);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "PID3_EMPTY");
        assert_eq!(issues[0].severity, Severity::Error);
    }

    #[test]
    fn test_event_code_mismatch_is_warning() {
        let text = format!("{MSH}\rEVN|A02|20240101");
        let msg = Message::parse(&text).unwrap();
        let issues = check(&msg);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, "EVN1_MISMATCH");
        assert_eq!(issues[0].severity, Severity::Warn);
    }

    #[test]
    fn test_coded_fields() {
        let text = format!(
            "{MSH}\rEVN|A01|20240101\rPID|||1||DOE||19800101|Q\rPV1||Z\rZBE|1|20240101||MOVE|||||X"
        );
        assert_eq!(
            codes(&text),
            vec![
                "PID8_INVALID_VALUE",
                "PV12_INVALID_VALUE",
                "ZBE4_INVALID_VALUE",
                "ZBE9_INVALID_VALUE"
            ]
        );
    }

    #[test]
    fn test_movement_segment_required_fields() {
        let text = format!("{MSH}\rZBE");
        assert_eq!(codes(&text), vec!["ZBE1_EMPTY", "ZBE2_EMPTY", "ZBE4_EMPTY"]);
    }

    #[test]
    fn test_absent_segments_are_skipped() {
        let text = format!("{MSH}\rEVN|A01|20240101");
        assert!(codes(&text).is_empty());
    }
}
