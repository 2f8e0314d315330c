//! Encounter lifecycle states

use serde::{Deserialize, Serialize};
use std::fmt;

/// Closed set of states an encounter can be in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EncounterState {
    /// No current encounter
    NoEncounter,
    PreAdmittedInpatient,
    PreAdmittedOutpatient,
    /// Registered outpatient visit
    Outpatient,
    Admitted,
    /// On temporary leave of absence
    OnLeave,
    Discharged,
    /// Encounter voided by cancelling its opening event
    Cancelled,
}

impl EncounterState {
    pub const ALL: [EncounterState; 8] = [
        EncounterState::NoEncounter,
        EncounterState::PreAdmittedInpatient,
        EncounterState::PreAdmittedOutpatient,
        EncounterState::Outpatient,
        EncounterState::Admitted,
        EncounterState::OnLeave,
        EncounterState::Discharged,
        EncounterState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EncounterState::NoEncounter => "no_encounter",
            EncounterState::PreAdmittedInpatient => "pre_admitted_inpatient",
            EncounterState::PreAdmittedOutpatient => "pre_admitted_outpatient",
            EncounterState::Outpatient => "outpatient",
            EncounterState::Admitted => "admitted",
            EncounterState::OnLeave => "on_leave",
            EncounterState::Discharged => "discharged",
            EncounterState::Cancelled => "cancelled",
        }
    }

    /// States in which an encounter is open
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            EncounterState::PreAdmittedInpatient
                | EncounterState::PreAdmittedOutpatient
                | EncounterState::Outpatient
                | EncounterState::Admitted
                | EncounterState::OnLeave
        )
    }

    /// Discharged and cancelled encounters only leave through cancellation
    pub fn is_terminal(&self) -> bool {
        matches!(self, EncounterState::Discharged | EncounterState::Cancelled)
    }
}

impl Default for EncounterState {
    fn default() -> Self {
        EncounterState::NoEncounter
    }
}

impl fmt::Display for EncounterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_active_and_terminal_are_disjoint() {
        for state in EncounterState::ALL {
            assert!(!(state.is_active() && state.is_terminal()), "{state}");
        }
        assert!(!EncounterState::NoEncounter.is_active());
        assert!(!EncounterState::NoEncounter.is_terminal());
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&EncounterState::PreAdmittedInpatient).unwrap();
        assert_eq!(json, "\"pre_admitted_inpatient\"");
    }
}
