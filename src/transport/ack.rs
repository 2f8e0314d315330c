//! Application acknowledgements
//!
//! Builds the ACK answered for every inbound message and reads the ACKs
//! returned by downstream systems.

use crate::domain::errors::DeliveryError;
use crate::hl7::{format_timestamp, new_control_id, Message, MessageHeader, Separators};
use chrono::Utc;
use std::fmt;

/// MSA-1 acknowledgement codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AckCode {
    /// Application accept
    AA,
    /// Application error: well-formed but failed business rules
    AE,
    /// Application reject: processing fault
    AR,
    /// Commit accept (enhanced mode)
    CA,
    CE,
    CR,
}

impl AckCode {
    pub fn parse(code: &str) -> Option<Self> {
        match code.trim() {
            "AA" => Some(AckCode::AA),
            "AE" => Some(AckCode::AE),
            "AR" => Some(AckCode::AR),
            "CA" => Some(AckCode::CA),
            "CE" => Some(AckCode::CE),
            "CR" => Some(AckCode::CR),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AckCode::AA => "AA",
            AckCode::AE => "AE",
            AckCode::AR => "AR",
            AckCode::CA => "CA",
            AckCode::CE => "CE",
            AckCode::CR => "CR",
        }
    }

    pub fn is_accept(&self) -> bool {
        matches!(self, AckCode::AA | AckCode::CA)
    }
}

impl fmt::Display for AckCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error details carried by AE/AR acknowledgements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckError {
    pub code: String,
    pub text: String,
}

/// Builds acknowledgements on behalf of the bridge
#[derive(Debug, Clone)]
pub struct AckBuilder {
    sending_application: String,
    sending_facility: String,
}

impl AckBuilder {
    pub fn new(sending_application: impl Into<String>, sending_facility: impl Into<String>) -> Self {
        Self {
            sending_application: sending_application.into(),
            sending_facility: sending_facility.into(),
        }
    }

    pub fn accept(&self, original: &MessageHeader) -> String {
        self.build(original, AckCode::AA, None)
    }

    /// AE carrying the first error-level issue
    pub fn reject(&self, original: &MessageHeader, code: &str, text: &str) -> String {
        self.build(
            original,
            AckCode::AE,
            Some(AckError {
                code: code.to_string(),
                text: text.to_string(),
            }),
        )
    }

    /// AR for framing, parsing and processing faults
    pub fn error(&self, original: &MessageHeader, code: &str, text: &str) -> String {
        self.build(
            original,
            AckCode::AR,
            Some(AckError {
                code: code.to_string(),
                text: text.to_string(),
            }),
        )
    }

    /// Assembles `MSH`, `MSA` and, when an error is given, `ERR`.
    ///
    /// Sender and receiver are swapped from the original header; when the
    /// original names no receiver our own identity is used.
    pub fn build(&self, original: &MessageHeader, code: AckCode, error: Option<AckError>) -> String {
        let seps = Separators::default();
        let or_self = |value: &str, own: &str| {
            if value.is_empty() {
                own.to_string()
            } else {
                seps.escape(value)
            }
        };
        let trigger = if original.trigger.is_empty() {
            String::new()
        } else {
            seps.escape(&original.trigger)
        };
        let processing_id = if original.processing_id.is_empty() {
            "P".to_string()
        } else {
            seps.escape(&original.processing_id)
        };

        let msh = format!(
            "MSH|{enc}|{app}|{fac}|{rapp}|{rfac}|{now}||ACK^{trigger}^ACK|{id}|{pid}|2.5",
            enc = seps.encoding_characters(),
            app = or_self(&original.receiving_application, &self.sending_application),
            fac = or_self(&original.receiving_facility, &self.sending_facility),
            rapp = seps.escape(&original.sending_application),
            rfac = seps.escape(&original.sending_facility),
            now = format_timestamp(Utc::now()),
            id = new_control_id(),
            pid = processing_id,
        );

        let mut segments = vec![msh];
        match &error {
            Some(err) => {
                let text = seps.escape(&err.text);
                segments.push(format!(
                    "MSA|{}|{}|{}",
                    code,
                    seps.escape(&original.control_id),
                    text
                ));
                segments.push(format!(
                    "ERR|||{}^{}|E||||{}",
                    seps.escape(&err.code),
                    text,
                    text
                ));
            }
            None => segments.push(format!(
                "MSA|{}|{}",
                code,
                seps.escape(&original.control_id)
            )),
        }

        let mut out = segments.join("\r");
        out.push('\r');
        out
    }
}

/// Acknowledgement returned by a downstream system
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AckReply {
    pub code: AckCode,
    /// MSA-2: control id of the acknowledged message
    pub control_id: String,
    pub text: Option<String>,
    pub error: Option<AckError>,
}

impl AckReply {
    pub fn is_accepted(&self) -> bool {
        self.code.is_accept()
    }

    /// Reads an ACK; anything without a valid MSA is malformed
    pub fn parse(text: &str) -> Result<Self, DeliveryError> {
        let message = Message::parse(text)
            .map_err(|e| DeliveryError::MalformedResponse(e.to_string()))?;
        let msa = message
            .segment("MSA")
            .ok_or_else(|| DeliveryError::MalformedResponse("no MSA segment".to_string()))?;
        let code = AckCode::parse(msa.field(1)).ok_or_else(|| {
            DeliveryError::MalformedResponse(format!("unknown ack code '{}'", msa.field(1)))
        })?;
        let seps = message.separators();
        let text = Some(seps.unescape(msa.field(3))).filter(|t| !t.is_empty());
        let error = message.segment("ERR").map(|err| AckError {
            code: seps.unescape(err.component(3, 1)),
            text: seps.unescape(err.component(3, 2)),
        });

        Ok(Self {
            code,
            control_id: msa.field(2).to_string(),
            text,
            error,
        })
    }

    /// Human-readable reason for a non-accepting reply
    pub fn reason(&self) -> String {
        let detail = self
            .error
            .as_ref()
            .map(|e| format!("{} {}", e.code, e.text))
            .or_else(|| self.text.clone())
            .unwrap_or_default();
        format!("{} {}", self.code, detail).trim().to_string()
    }
}
