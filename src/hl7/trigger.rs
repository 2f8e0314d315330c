//! ADT trigger events
//!
//! Closed enumeration of the patient-administration trigger events the bridge
//! understands. Unknown codes are preserved verbatim in [`TriggerEvent::Other`]
//! so that they can still be echoed, logged and rejected by the workflow
//! allow-list.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// An ADT trigger event (MSH-9.2 / EVN-1)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TriggerEvent {
    /// Admit/visit notification
    A01,
    /// Transfer a patient
    A02,
    /// Discharge/end visit
    A03,
    /// Register a patient (outpatient visit)
    A04,
    /// Pre-admit a patient
    A05,
    /// Change an outpatient to an inpatient
    A06,
    /// Change an inpatient to an outpatient
    A07,
    /// Update patient information
    A08,
    /// Cancel admit/visit notification
    A11,
    /// Cancel transfer
    A12,
    /// Cancel discharge/end visit
    A13,
    /// Patient goes on a leave of absence
    A21,
    /// Patient returns from a leave of absence
    A22,
    /// Add person information
    A28,
    /// Update person information
    A31,
    /// Cancel pre-admit
    A38,
    /// Merge patient identifier list
    A40,
    /// Cancel leave of absence
    A52,
    /// Cancel patient returns from leave of absence
    A53,
    /// Change attending doctor
    A54,
    /// Cancel change attending doctor
    A55,
    /// Any other code, preserved verbatim
    Other(String),
}

impl TriggerEvent {
    /// Every named trigger, in code order
    pub const KNOWN: [TriggerEvent; 21] = [
        TriggerEvent::A01,
        TriggerEvent::A02,
        TriggerEvent::A03,
        TriggerEvent::A04,
        TriggerEvent::A05,
        TriggerEvent::A06,
        TriggerEvent::A07,
        TriggerEvent::A08,
        TriggerEvent::A11,
        TriggerEvent::A12,
        TriggerEvent::A13,
        TriggerEvent::A21,
        TriggerEvent::A22,
        TriggerEvent::A28,
        TriggerEvent::A31,
        TriggerEvent::A38,
        TriggerEvent::A40,
        TriggerEvent::A52,
        TriggerEvent::A53,
        TriggerEvent::A54,
        TriggerEvent::A55,
    ];

    /// Parses a trigger code; unknown codes become [`TriggerEvent::Other`]
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_uppercase().as_str() {
            "A01" => Self::A01,
            "A02" => Self::A02,
            "A03" => Self::A03,
            "A04" => Self::A04,
            "A05" => Self::A05,
            "A06" => Self::A06,
            "A07" => Self::A07,
            "A08" => Self::A08,
            "A11" => Self::A11,
            "A12" => Self::A12,
            "A13" => Self::A13,
            "A21" => Self::A21,
            "A22" => Self::A22,
            "A28" => Self::A28,
            "A31" => Self::A31,
            "A38" => Self::A38,
            "A40" => Self::A40,
            "A52" => Self::A52,
            "A53" => Self::A53,
            "A54" => Self::A54,
            "A55" => Self::A55,
            _ => Self::Other(code.trim().to_string()),
        }
    }

    /// Returns the wire code of the trigger
    pub fn code(&self) -> &str {
        match self {
            Self::A01 => "A01",
            Self::A02 => "A02",
            Self::A03 => "A03",
            Self::A04 => "A04",
            Self::A05 => "A05",
            Self::A06 => "A06",
            Self::A07 => "A07",
            Self::A08 => "A08",
            Self::A11 => "A11",
            Self::A12 => "A12",
            Self::A13 => "A13",
            Self::A21 => "A21",
            Self::A22 => "A22",
            Self::A28 => "A28",
            Self::A31 => "A31",
            Self::A38 => "A38",
            Self::A40 => "A40",
            Self::A52 => "A52",
            Self::A53 => "A53",
            Self::A54 => "A54",
            Self::A55 => "A55",
            Self::Other(code) => code.as_str(),
        }
    }

    /// Triggers that record a lifecycle event on an encounter
    pub fn is_movement(&self) -> bool {
        matches!(
            self,
            Self::A01
                | Self::A02
                | Self::A03
                | Self::A04
                | Self::A05
                | Self::A06
                | Self::A07
                | Self::A11
                | Self::A12
                | Self::A13
                | Self::A21
                | Self::A22
                | Self::A38
                | Self::A52
                | Self::A53
                | Self::A54
                | Self::A55
        )
    }

    /// Triggers that only touch patient identity, never an encounter
    pub fn is_identity_only(&self) -> bool {
        matches!(self, Self::A28 | Self::A31 | Self::A40)
    }

    /// Triggers that may open a scenario
    pub fn is_initial(&self) -> bool {
        matches!(
            self,
            Self::A01 | Self::A04 | Self::A05 | Self::A28 | Self::A31
        )
    }

    /// Returns the trigger this one cancels, if it is a cancellation
    pub fn cancels(&self) -> Option<&'static [TriggerEvent]> {
        match self {
            Self::A11 => Some(&[TriggerEvent::A01, TriggerEvent::A04]),
            Self::A12 => Some(&[TriggerEvent::A02]),
            Self::A13 => Some(&[TriggerEvent::A03]),
            Self::A38 => Some(&[TriggerEvent::A05]),
            Self::A52 => Some(&[TriggerEvent::A21]),
            Self::A53 => Some(&[TriggerEvent::A22]),
            Self::A55 => Some(&[TriggerEvent::A54]),
            _ => None,
        }
    }

    /// True for cancellation triggers
    pub fn is_cancellation(&self) -> bool {
        self.cancels().is_some()
    }

    /// HL7 abstract message structure used by this trigger
    pub fn structure(&self) -> &'static str {
        match self {
            Self::A01 | Self::A04 | Self::A05 | Self::A08 | Self::A13 | Self::A28 | Self::A31 => {
                "ADT_A01"
            }
            Self::A02 => "ADT_A02",
            Self::A03 => "ADT_A03",
            Self::A06 | Self::A07 => "ADT_A06",
            Self::A11 | Self::A12 | Self::A38 => "ADT_A09",
            Self::A21 | Self::A22 | Self::A52 | Self::A53 => "ADT_A21",
            Self::A40 => "ADT_A39",
            Self::A54 | Self::A55 => "ADT_A54",
            Self::Other(_) => "ADT_A01",
        }
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

impl FromStr for TriggerEvent {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::parse(s))
    }
}

impl From<String> for TriggerEvent {
    fn from(code: String) -> Self {
        Self::parse(&code)
    }
}

impl From<TriggerEvent> for String {
    fn from(trigger: TriggerEvent) -> Self {
        trigger.code().to_string()
    }
}
