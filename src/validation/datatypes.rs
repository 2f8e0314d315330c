//! Composite-datatype layer
//!
//! Checks the components of CX, XPN, XAD, XTN, TS, PL and XCN fields.
//! Repeating fields are checked per repetition and their codes carry the
//! 1-based repetition index (`PID3_2_ID_MISSING`). Empty fields are left to
//! the base-standard layer.

use super::issue::{Severity, ValidationIssue};
use crate::hl7::{split_components, Hl7Timestamp, Message, Segment, TimestampError};

/// HL7 table 0203 (identifier type), common subset
const IDENTIFIER_TYPES: &[&str] = &[
    "AN", "BR", "DL", "EI", "INS", "MR", "NH", "NI", "NII", "NIIP", "NN", "PI", "PN", "PPN", "PT",
    "RRI", "SS", "VN", "XX",
];

/// HL7 table 0200 (name type)
const NAME_TYPES: &[&str] = &[
    "A", "B", "BAD", "C", "D", "I", "K", "L", "M", "N", "P", "R", "S", "T", "U",
];

/// HL7 table 0190 (address type)
const ADDRESS_TYPES: &[&str] = &[
    "B", "BA", "BDL", "BI", "BR", "C", "F", "H", "L", "M", "N", "O", "P", "RH",
];

/// HL7 table 0201 (telecommunication use)
const TELECOM_USES: &[&str] = &["ASN", "BPN", "EMR", "NET", "ORN", "PRN", "PRS", "VHN", "WPN"];

/// HL7 table 0202 (telecommunication equipment)
const TELECOM_EQUIPMENT: &[&str] = &[
    "BP", "CP", "FX", "Internet", "MD", "PH", "SAT", "TDD", "TTY", "X.400",
];

/// Timestamp fields checked, as (segment, field)
const TIMESTAMP_FIELDS: &[(&str, usize)] = &[
    ("MSH", 7),
    ("EVN", 2),
    ("PID", 7),
    ("PV1", 44),
    ("PV1", 45),
    ("ZBE", 2),
];

pub fn check(message: &Message) -> Vec<ValidationIssue> {
    let mut issues = Vec::new();

    if let Some(pid) = message.segment("PID") {
        check_cx(pid, 3, &mut issues);
        check_xpn(pid, 5, &mut issues);
        check_xad(pid, 11, &mut issues);
        check_xtn(pid, 13, &mut issues);
        check_xtn(pid, 14, &mut issues);
    }

    if let Some(pv1) = message.segment("PV1") {
        check_pl(pv1, 3, &mut issues);
        for field in [7, 8, 17] {
            check_xcn(pv1, field, &mut issues);
        }
    }

    for (name, field) in TIMESTAMP_FIELDS {
        if let Some(segment) = message.segment(name) {
            check_ts(segment, *field, &mut issues);
        }
    }

    issues
}

/// Issue code prefix for a field, with the repetition index when it repeats
fn prefix(segment: &Segment, field: usize, repetition: Option<usize>) -> String {
    match repetition {
        Some(rep) => format!("{}{field}_{rep}", segment.name()),
        None => format!("{}{field}", segment.name()),
    }
}

fn location(segment: &Segment, field: usize, repetition: Option<usize>, component: usize) -> String {
    match repetition {
        Some(rep) => format!("{}-{field}[{rep}].{component}", segment.name()),
        None => format!("{}-{field}.{component}", segment.name()),
    }
}

#[allow(clippy::too_many_arguments)]
fn push(
    issues: &mut Vec<ValidationIssue>,
    severity: Severity,
    segment: &Segment,
    field: usize,
    repetition: Option<usize>,
    component: usize,
    subcode: &str,
    message: String,
) {
    issues.push(ValidationIssue::new(
        format!("{}_{subcode}", prefix(segment, field, repetition)),
        location(segment, field, repetition, component),
        severity,
        message,
    ));
}

/// Repetitions of a field, each split into components, with 1-based indexes
fn repetitions<'a>(segment: &'a Segment, field: usize) -> Vec<(usize, Vec<&'a str>)> {
    segment
        .repetitions(field)
        .into_iter()
        .enumerate()
        .map(|(i, rep)| (i + 1, split_components(rep, segment.separators())))
        .collect()
}

fn component<'a>(components: &[&'a str], n: usize) -> &'a str {
    components.get(n - 1).copied().unwrap_or("")
}

/// First subcomponent of a component
fn first_subcomponent<'a>(segment: &Segment, value: &'a str) -> &'a str {
    value
        .split(segment.separators().subcomponent)
        .next()
        .unwrap_or("")
}

/// CX: extended composite identifier
fn check_cx(segment: &Segment, field: usize, issues: &mut Vec<ValidationIssue>) {
    for (rep, comps) in repetitions(segment, field) {
        let rep = Some(rep);
        if component(&comps, 1).is_empty() {
            push(issues, Severity::Error, segment, field, rep, 1, "ID_MISSING",
                "identifier value is missing".to_string());
        }
        if first_subcomponent(segment, component(&comps, 4)).is_empty() {
            push(issues, Severity::Warn, segment, field, rep, 4, "AUTHORITY_MISSING",
                "assigning authority is missing".to_string());
        }
        let id_type = component(&comps, 5);
        if !id_type.is_empty() && !IDENTIFIER_TYPES.contains(&id_type) {
            push(issues, Severity::Warn, segment, field, rep, 5, "TYPE_INVALID",
                format!("identifier type {id_type} is not in table 0203"));
        }
    }
}

/// XPN: extended person name
fn check_xpn(segment: &Segment, field: usize, issues: &mut Vec<ValidationIssue>) {
    for (rep, comps) in repetitions(segment, field) {
        let rep = Some(rep);
        if first_subcomponent(segment, component(&comps, 1)).is_empty() {
            push(issues, Severity::Error, segment, field, rep, 1, "FAMILY_MISSING",
                "family name is missing".to_string());
        }
        let name_type = component(&comps, 7);
        if !name_type.is_empty() && !NAME_TYPES.contains(&name_type) {
            push(issues, Severity::Warn, segment, field, rep, 7, "TYPE_INVALID",
                format!("name type {name_type} is not in table 0200"));
        }
    }
}

/// XAD: extended address
fn check_xad(segment: &Segment, field: usize, issues: &mut Vec<ValidationIssue>) {
    for (rep, comps) in repetitions(segment, field) {
        let rep = Some(rep);
        let country = component(&comps, 6);
        let valid_country = country.len() == 3 && country.chars().all(|c| c.is_ascii_uppercase());
        if !country.is_empty() && !valid_country {
            push(issues, Severity::Warn, segment, field, rep, 6, "COUNTRY_INVALID",
                format!("country {country} is not an ISO 3166 alpha-3 code"));
        }
        let address_type = component(&comps, 7);
        if !address_type.is_empty() && !ADDRESS_TYPES.contains(&address_type) {
            push(issues, Severity::Warn, segment, field, rep, 7, "TYPE_INVALID",
                format!("address type {address_type} is not in table 0190"));
        }
    }
}

/// XTN: extended telecommunication number
fn check_xtn(segment: &Segment, field: usize, issues: &mut Vec<ValidationIssue>) {
    for (rep, comps) in repetitions(segment, field) {
        let rep = Some(rep);
        let use_code = component(&comps, 2);
        if !use_code.is_empty() && !TELECOM_USES.contains(&use_code) {
            push(issues, Severity::Warn, segment, field, rep, 2, "USE_INVALID",
                format!("telecommunication use {use_code} is not in table 0201"));
        }
        let equipment = component(&comps, 3);
        if !equipment.is_empty() && !TELECOM_EQUIPMENT.contains(&equipment) {
            push(issues, Severity::Warn, segment, field, rep, 3, "EQUIPMENT_INVALID",
                format!("equipment type {equipment} is not in table 0202"));
        }
        let has_number = [1, 4, 7, 12]
            .iter()
            .any(|n| !component(&comps, *n).is_empty());
        if !has_number {
            push(issues, Severity::Warn, segment, field, rep, 1, "NUMBER_MISSING",
                "no telephone number, email address or local number".to_string());
        }
    }
}

/// PL: person location
fn check_pl(segment: &Segment, field: usize, issues: &mut Vec<ValidationIssue>) {
    for (_, comps) in repetitions(segment, field).into_iter().take(1) {
        if component(&comps, 1).is_empty() {
            push(issues, Severity::Warn, segment, field, None, 1, "POINT_OF_CARE_MISSING",
                "point of care is missing".to_string());
        }
    }
}

/// XCN: extended composite ID and name for persons
fn check_xcn(segment: &Segment, field: usize, issues: &mut Vec<ValidationIssue>) {
    for (rep, comps) in repetitions(segment, field) {
        let rep = Some(rep);
        let id = component(&comps, 1);
        let family = first_subcomponent(segment, component(&comps, 2));
        if id.is_empty() && family.is_empty() {
            push(issues, Severity::Error, segment, field, rep, 1, "ID_MISSING",
                "practitioner has neither identifier nor family name".to_string());
        }
        let id_type = component(&comps, 13);
        if !id_type.is_empty() && !IDENTIFIER_TYPES.contains(&id_type) {
            push(issues, Severity::Warn, segment, field, rep, 13, "TYPE_INVALID",
                format!("identifier type {id_type} is not in table 0203"));
        }
    }
}

/// TS/DTM: timestamp, first component only
fn check_ts(segment: &Segment, field: usize, issues: &mut Vec<ValidationIssue>) {
    let value = segment.component(field, 1);
    if value.is_empty() {
        return;
    }
    let err = match Hl7Timestamp::parse(value) {
        Ok(_) => return,
        Err(err) => err,
    };
    let (subcode, severity) = match err {
        TimestampError::TooShort | TimestampError::Format => ("FORMAT_INVALID", Severity::Error),
        TimestampError::Month => ("MONTH_INVALID", Severity::Error),
        TimestampError::Day => ("DAY_INVALID", Severity::Error),
        TimestampError::Hour => ("HOUR_INVALID", Severity::Error),
        TimestampError::Minute => ("MINUTE_INVALID", Severity::Error),
        TimestampError::Second => ("SECOND_INVALID", Severity::Error),
        TimestampError::Offset => ("TIMEZONE_INVALID", Severity::Warn),
    };
    push(issues, severity, segment, field, None, 1, subcode,
        format!("timestamp '{value}': {err}"));
}
