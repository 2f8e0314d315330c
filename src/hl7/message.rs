//! HL7 v2 message model and parser
//!
//! Messages are split into segments on carriage return (line feeds are
//! tolerated). Separators are read from MSH-1 and MSH-2. Field numbering is
//! 1-based and follows the standard: for MSH, field 1 is the field separator
//! itself and field 2 the encoding characters.

use crate::domain::errors::ParseError;
use crate::hl7::trigger::TriggerEvent;
use serde::{Deserialize, Serialize};

/// Delimiters declared by a message header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Separators {
    pub field: char,
    pub component: char,
    pub repetition: char,
    pub escape: char,
    pub subcomponent: char,
}

impl Default for Separators {
    fn default() -> Self {
        Self {
            field: '|',
            component: '^',
            repetition: '~',
            escape: '\\',
            subcomponent: '&',
        }
    }
}

impl Separators {
    /// The MSH-2 encoding characters
    pub fn encoding_characters(&self) -> String {
        [self.component, self.repetition, self.escape, self.subcomponent]
            .iter()
            .collect()
    }

    /// Escapes delimiter characters inside a value
    pub fn escape(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        for c in value.chars() {
            if c == self.escape {
                out.push(self.escape);
                out.push('E');
                out.push(self.escape);
            } else if c == self.field {
                out.push(self.escape);
                out.push('F');
                out.push(self.escape);
            } else if c == self.component {
                out.push(self.escape);
                out.push('S');
                out.push(self.escape);
            } else if c == self.subcomponent {
                out.push(self.escape);
                out.push('T');
                out.push(self.escape);
            } else if c == self.repetition {
                out.push(self.escape);
                out.push('R');
                out.push(self.escape);
            } else if c == '\r' || c == '\n' {
                out.push(' ');
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Reverses [`Separators::escape`]; unknown escape sequences are kept
    pub fn unescape(&self, value: &str) -> String {
        if !value.contains(self.escape) {
            return value.to_string();
        }
        let mut out = String::with_capacity(value.len());
        let mut chars = value.chars().peekable();
        while let Some(c) = chars.next() {
            if c != self.escape {
                out.push(c);
                continue;
            }
            let mut seq = String::new();
            let mut closed = false;
            for n in chars.by_ref() {
                if n == self.escape {
                    closed = true;
                    break;
                }
                seq.push(n);
            }
            match (closed, seq.as_str()) {
                (true, "F") => out.push(self.field),
                (true, "S") => out.push(self.component),
                (true, "T") => out.push(self.subcomponent),
                (true, "R") => out.push(self.repetition),
                (true, "E") => out.push(self.escape),
                _ => {
                    out.push(self.escape);
                    out.push_str(&seq);
                    if closed {
                        out.push(self.escape);
                    }
                }
            }
        }
        out
    }
}

/// A single segment: its three-letter identifier and its fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    name: String,
    fields: Vec<String>,
    separators: Separators,
}

impl Segment {
    /// Builds a segment from already-encoded field values.
    ///
    /// For MSH, pass fields starting at MSH-3; MSH-1 and MSH-2 are derived
    /// from the separators.
    pub fn new(name: impl Into<String>, fields: Vec<String>, separators: Separators) -> Self {
        let name = name.into();
        let fields = if name == "MSH" {
            let mut all = vec![separators.field.to_string(), separators.encoding_characters()];
            all.extend(fields);
            all
        } else {
            fields
        };
        Self {
            name,
            fields,
            separators,
        }
    }

    /// Segment identifier, e.g. `PID`
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of fields present (trailing empties included)
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Raw value of field `n` (1-based); empty when absent
    pub fn field(&self, n: usize) -> &str {
        if n == 0 {
            return &self.name;
        }
        self.fields.get(n - 1).map(String::as_str).unwrap_or("")
    }

    /// Repetitions of field `n`; an empty field has none
    pub fn repetitions(&self, n: usize) -> Vec<&str> {
        let raw = self.field(n);
        if raw.is_empty() {
            return Vec::new();
        }
        if self.name == "MSH" && n <= 2 {
            return vec![raw];
        }
        raw.split(self.separators.repetition).collect()
    }

    /// Component `c` (1-based) of the first repetition of field `n`
    pub fn component(&self, n: usize, c: usize) -> &str {
        let first = self
            .repetitions(n)
            .into_iter()
            .next()
            .unwrap_or("");
        split_components(first, &self.separators)
            .get(c.saturating_sub(1))
            .copied()
            .unwrap_or("")
    }

    /// Separators this segment was parsed with
    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    /// Encodes the segment back to wire text (without terminator)
    pub fn encode(&self) -> String {
        let sep = self.separators.field.to_string();
        if self.name == "MSH" {
            let mut out = String::from("MSH");
            out.push(self.separators.field);
            out.push_str(&self.fields.iter().skip(1).cloned().collect::<Vec<_>>().join(&sep));
            return out;
        }
        if self.fields.is_empty() {
            return self.name.clone();
        }
        format!("{}{}{}", self.name, sep, self.fields.join(&sep))
    }
}

/// Splits a field (or repetition) into its components
pub fn split_components<'a>(value: &'a str, separators: &Separators) -> Vec<&'a str> {
    if value.is_empty() {
        return Vec::new();
    }
    value.split(separators.component).collect()
}

/// The header values every layer of the bridge needs
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageHeader {
    pub sending_application: String,
    pub sending_facility: String,
    pub receiving_application: String,
    pub receiving_facility: String,
    pub timestamp: String,
    pub message_type: String,
    pub trigger: String,
    pub structure: String,
    pub control_id: String,
    pub processing_id: String,
    pub version: String,
}

impl MessageHeader {
    /// Reads the header values from an MSH segment
    pub fn from_segment(msh: &Segment) -> Self {
        Self {
            sending_application: msh.component(3, 1).to_string(),
            sending_facility: msh.component(4, 1).to_string(),
            receiving_application: msh.component(5, 1).to_string(),
            receiving_facility: msh.component(6, 1).to_string(),
            timestamp: msh.component(7, 1).to_string(),
            message_type: msh.component(9, 1).to_string(),
            trigger: msh.component(9, 2).to_string(),
            structure: msh.component(9, 3).to_string(),
            control_id: msh.field(10).to_string(),
            processing_id: msh.component(11, 1).to_string(),
            version: msh.component(12, 1).to_string(),
        }
    }
}

/// A parsed HL7 v2 message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    segments: Vec<Segment>,
    separators: Separators,
}

impl Message {
    /// Parses wire text into a message
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let lines: Vec<&str> = input
            .split(['\r', '\n'])
            .map(str::trim_end)
            .filter(|l| !l.trim().is_empty())
            .collect();

        let first = match lines.first() {
            Some(first) => first.trim_start(),
            None => return Err(ParseError::Empty),
        };
        if !first.starts_with("MSH") {
            return Err(ParseError::MissingHeader);
        }
        let separators = read_separators(first)?;

        let mut segments = Vec::with_capacity(lines.len());
        for (idx, line) in lines.iter().enumerate() {
            let line = if idx == 0 { line.trim_start() } else { *line };
            segments.push(parse_segment(line, &separators)?);
        }

        Ok(Self {
            segments,
            separators,
        })
    }

    /// Assembles a message from segments; the first must be MSH
    pub fn from_segments(segments: Vec<Segment>, separators: Separators) -> Self {
        Self {
            segments,
            separators,
        }
    }

    pub fn separators(&self) -> &Separators {
        &self.separators
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// First segment with the given identifier
    pub fn segment(&self, name: &str) -> Option<&Segment> {
        self.segments.iter().find(|s| s.name == name)
    }

    /// All segments with the given identifier, in message order
    pub fn segments_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Segment> + 'a {
        self.segments.iter().filter(move |s| s.name == name)
    }

    pub fn has_segment(&self, name: &str) -> bool {
        self.segment(name).is_some()
    }

    /// Segment identifiers in message order
    pub fn segment_names(&self) -> Vec<&str> {
        self.segments.iter().map(|s| s.name.as_str()).collect()
    }

    /// Header values; the first segment is always MSH for parsed messages
    pub fn header(&self) -> MessageHeader {
        self.segment("MSH")
            .map(MessageHeader::from_segment)
            .unwrap_or_default()
    }

    /// Trigger from MSH-9.2, falling back to EVN-1
    pub fn trigger(&self) -> Option<TriggerEvent> {
        let from_msh = self
            .segment("MSH")
            .map(|s| s.component(9, 2))
            .filter(|c| !c.is_empty());
        let code = from_msh.or_else(|| {
            self.segment("EVN")
                .map(|s| s.field(1))
                .filter(|c| !c.is_empty())
        })?;
        Some(TriggerEvent::parse(code))
    }

    /// MSH-10
    pub fn control_id(&self) -> &str {
        self.segment("MSH").map(|s| s.field(10)).unwrap_or("")
    }

    /// First non-empty PID-3 identifier (component 1)
    pub fn patient_identifier(&self) -> Option<String> {
        let pid = self.segment("PID")?;
        pid.repetitions(3)
            .into_iter()
            .map(|rep| {
                split_components(rep, &self.separators)
                    .first()
                    .copied()
                    .unwrap_or("")
            })
            .find(|id| !id.is_empty())
            .map(|id| self.separators.unescape(id))
    }

    /// PV1-19 visit number (component 1)
    pub fn visit_number(&self) -> Option<String> {
        let pv1 = self.segment("PV1")?;
        let visit = pv1.component(19, 1);
        if visit.is_empty() {
            None
        } else {
            Some(self.separators.unescape(visit))
        }
    }

    /// Event timestamp: EVN-2, falling back to MSH-7
    pub fn event_timestamp(&self) -> Option<&str> {
        self.segment("EVN")
            .map(|s| s.component(2, 1))
            .filter(|v| !v.is_empty())
            .or_else(|| {
                self.segment("MSH")
                    .map(|s| s.component(7, 1))
                    .filter(|v| !v.is_empty())
            })
    }

    /// Encodes the message back to wire text, segments terminated by CR
    pub fn encode(&self) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            out.push_str(&segment.encode());
            out.push('\r');
        }
        out
    }
}

/// Fresh MSH-10 control id (20 characters, the field's maximum length)
pub fn new_control_id() -> String {
    let mut id = uuid::Uuid::new_v4().simple().to_string().to_ascii_uppercase();
    id.truncate(20);
    id
}

fn read_separators(msh: &str) -> Result<Separators, ParseError> {
    let chars: Vec<char> = msh.chars().take(8).collect();
    if chars.len() < 8 {
        return Err(ParseError::InvalidEncodingCharacters);
    }
    let separators = Separators {
        field: chars[3],
        component: chars[4],
        repetition: chars[5],
        escape: chars[6],
        subcomponent: chars[7],
    };
    let all = [
        separators.field,
        separators.component,
        separators.repetition,
        separators.escape,
        separators.subcomponent,
    ];
    for (i, c) in all.iter().enumerate() {
        if c.is_alphanumeric() || c.is_whitespace() || all[i + 1..].contains(c) {
            return Err(ParseError::InvalidEncodingCharacters);
        }
    }
    Ok(separators)
}

fn parse_segment(line: &str, separators: &Separators) -> Result<Segment, ParseError> {
    let name: String = line.chars().take(3).collect();
    let valid_name = name.chars().count() == 3
        && name
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit());
    if !valid_name {
        return Err(ParseError::InvalidSegment(name));
    }

    let rest = &line[name.len()..];
    if !rest.is_empty() && !rest.starts_with(separators.field) {
        return Err(ParseError::InvalidSegment(
            line.chars().take(8).collect::<String>(),
        ));
    }

    let fields = if name == "MSH" {
        let mut fields = vec![separators.field.to_string()];
        fields.extend(
            rest[separators.field.len_utf8()..]
                .split(separators.field)
                .map(str::to_string),
        );
        fields
    } else if rest.is_empty() {
        Vec::new()
    } else {
        rest[separators.field.len_utf8()..]
            .split(separators.field)
            .map(str::to_string)
            .collect()
    };

    Ok(Segment {
        name,
        fields,
        separators: *separators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const ADMIT: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20240101120000||ADT^A01^ADT_A01|MSG0001|P|2.5\r\
EVN|A01|20240101120000\r\
PID|||12345^^^HOSP^PI~999^^^NAT^NI||DOE^JOHN^^^^^L||19800101|M\r\
PV1||I|WARD1^101^A||||||||||||||||V0001\r";

    #[test]
    fn test_parse_segments_in_order() {
        let msg = Message::parse(ADMIT).unwrap();
        assert_eq!(msg.segment_names(), vec!["MSH", "EVN", "PID", "PV1"]);
    }

    #[test]
    fn test_msh_field_numbering() {
        let msg = Message::parse(ADMIT).unwrap();
        let msh = msg.segment("MSH").unwrap();
        assert_eq!(msh.field(1), "|");
        assert_eq!(msh.field(2), "^~\\&");
        assert_eq!(msh.field(3), "HIS");
        assert_eq!(msh.field(10), "MSG0001");
        assert_eq!(msh.component(9, 2), "A01");
    }

    #[test]
    fn test_header_extraction() {
        let header = Message::parse(ADMIT).unwrap().header();
        assert_eq!(header.sending_application, "HIS");
        assert_eq!(header.receiving_facility, "HOSP");
        assert_eq!(header.message_type, "ADT");
        assert_eq!(header.trigger, "A01");
        assert_eq!(header.structure, "ADT_A01");
        assert_eq!(header.version, "2.5");
    }

    #[test]
    fn test_repetitions_and_components() {
        let msg = Message::parse(ADMIT).unwrap();
        let pid = msg.segment("PID").unwrap();
        let reps = pid.repetitions(3);
        assert_eq!(reps.len(), 2);
        assert_eq!(pid.component(5, 1), "DOE");
        assert_eq!(pid.component(5, 2), "JOHN");
        assert_eq!(pid.component(5, 30), "");
        assert!(pid.repetitions(4).is_empty());
    }

    #[test]
    fn test_business_keys() {
        let msg = Message::parse(ADMIT).unwrap();
        assert_eq!(msg.trigger(), Some(TriggerEvent::A01));
        assert_eq!(msg.patient_identifier().as_deref(), Some("12345"));
        assert_eq!(msg.visit_number().as_deref(), Some("V0001"));
        assert_eq!(msg.event_timestamp(), Some("20240101120000"));
    }

    #[test]
    fn test_trigger_falls_back_to_evn() {
        let msg = Message::parse("MSH|^~\\&|A|B|C|D|20240101||ADT|1|P|2.5\rEVN|A03|20240101\r").unwrap();
        assert_eq!(msg.trigger(), Some(TriggerEvent::A03));
    }

    #[test]
    fn test_accepts_line_feeds() {
        let msg = Message::parse("MSH|^~\\&|A|B\nPID|||1\n").unwrap();
        assert_eq!(msg.segment_names(), vec!["MSH", "PID"]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Message::parse(""), Err(ParseError::Empty));
        assert_eq!(Message::parse("PID|||1\r"), Err(ParseError::MissingHeader));
        assert_eq!(
            Message::parse("MSH|^~"),
            Err(ParseError::InvalidEncodingCharacters)
        );
        assert!(matches!(
            Message::parse("MSH|^~\\&|A\rpid|1\r"),
            Err(ParseError::InvalidSegment(_))
        ));
    }

    #[test]
    fn test_encode_round_trips_wire_text() {
        let msg = Message::parse(ADMIT).unwrap();
        assert_eq!(msg.encode(), ADMIT);
    }

    #[test]
    fn test_escape_and_unescape() {
        let seps = Separators::default();
        let escaped = seps.escape("A|B^C&D~E\\F");
        assert_eq!(escaped, "A\\F\\B\\S\\C\\T\\D\\R\\E\\E\\F");
        assert_eq!(seps.unescape(&escaped), "A|B^C&D~E\\F");
    }

    #[test]
    fn test_control_ids_are_unique() {
        let a = new_control_id();
        assert_eq!(a.len(), 20);
        assert_ne!(a, new_control_id());
    }

    #[test]
    fn test_segment_builder_for_msh() {
        let seps = Separators::default();
        let msh = Segment::new("MSH", vec!["APP".into(), "FAC".into()], seps);
        assert_eq!(msh.encode(), "MSH|^~\\&|APP|FAC");
        assert_eq!(msh.field(3), "APP");
    }
}
