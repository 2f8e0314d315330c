//! Encounter and movement domain models
//!
//! An encounter is one patient stay or visit. Its lifecycle is recorded as an
//! append-only list of movements; the current state is always the fold of
//! those movements through the workflow state machine.

use super::errors::TransitionError;
use super::ids::{EncounterIdentifier, EntityId, PatientIdentifier};
use crate::hl7::TriggerEvent;
use crate::workflow::{EncounterState, EncounterWorkflow, Step};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Patient class (PV1-2, HL7 table 0004)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatientClass {
    Emergency,
    Inpatient,
    Outpatient,
    Preadmit,
    RecurringPatient,
    Obstetrics,
    CommercialAccount,
    NotApplicable,
    Unknown,
}

impl PatientClass {
    /// Valid PV1-2 codes
    pub const CODES: [&'static str; 9] = ["E", "I", "O", "P", "R", "B", "C", "N", "U"];

    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim() {
            "E" => Some(PatientClass::Emergency),
            "I" => Some(PatientClass::Inpatient),
            "O" => Some(PatientClass::Outpatient),
            "P" => Some(PatientClass::Preadmit),
            "R" => Some(PatientClass::RecurringPatient),
            "B" => Some(PatientClass::Obstetrics),
            "C" => Some(PatientClass::CommercialAccount),
            "N" => Some(PatientClass::NotApplicable),
            "U" => Some(PatientClass::Unknown),
            _ => None,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            PatientClass::Emergency => "E",
            PatientClass::Inpatient => "I",
            PatientClass::Outpatient => "O",
            PatientClass::Preadmit => "P",
            PatientClass::RecurringPatient => "R",
            PatientClass::Obstetrics => "B",
            PatientClass::CommercialAccount => "C",
            PatientClass::NotApplicable => "N",
            PatientClass::Unknown => "U",
        }
    }

    /// Classes handled as outpatient visits
    pub fn is_outpatient(&self) -> bool {
        matches!(self, PatientClass::Outpatient | PatientClass::RecurringPatient)
    }
}

impl Default for PatientClass {
    fn default() -> Self {
        PatientClass::Inpatient
    }
}

/// One lifecycle event of an encounter. Never modified once appended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: EntityId,
    pub encounter_id: EntityId,
    /// Position within the encounter, starting at 1
    pub sequence: u32,
    pub trigger: TriggerEvent,
    pub occurred_at: DateTime<Utc>,
    /// Responsible unit at the time of the movement (PV1-3 / ZBE-7)
    pub responsible_unit: Option<String>,
    /// Movement nature (ZBE-9)
    pub nature: Option<String>,
    pub patient_class: PatientClass,
    /// Movements are immutable; their version is always 1
    pub version: u64,
}

impl Movement {
    pub fn builder() -> MovementBuilder {
        MovementBuilder::default()
    }
}

/// Builder for [`Movement`]
#[derive(Debug, Default)]
pub struct MovementBuilder {
    trigger: Option<TriggerEvent>,
    occurred_at: Option<DateTime<Utc>>,
    responsible_unit: Option<String>,
    nature: Option<String>,
    patient_class: Option<PatientClass>,
}

impl MovementBuilder {
    pub fn trigger(mut self, trigger: TriggerEvent) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn occurred_at(mut self, at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(at);
        self
    }

    pub fn responsible_unit(mut self, unit: Option<String>) -> Self {
        self.responsible_unit = unit.filter(|u| !u.is_empty());
        self
    }

    pub fn nature(mut self, nature: Option<String>) -> Self {
        self.nature = nature.filter(|n| !n.is_empty());
        self
    }

    pub fn patient_class(mut self, class: PatientClass) -> Self {
        self.patient_class = Some(class);
        self
    }

    /// Builds a movement not yet attached to an encounter
    pub fn build(self) -> Result<Movement, String> {
        let trigger = self.trigger.ok_or("trigger is required")?;
        if !trigger.is_movement() {
            return Err(format!("trigger {trigger} does not record a movement"));
        }
        Ok(Movement {
            id: EntityId::new(),
            encounter_id: EntityId::default(),
            sequence: 0,
            trigger,
            occurred_at: self.occurred_at.unwrap_or_else(Utc::now),
            responsible_unit: self.responsible_unit,
            nature: self.nature,
            patient_class: self.patient_class.unwrap_or_default(),
            version: 1,
        })
    }
}

/// One patient stay or visit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Encounter {
    pub id: EntityId,
    pub identifier: EncounterIdentifier,
    pub patient_id: EntityId,
    pub patient_identifier: PatientIdentifier,
    pub current_state: EncounterState,
    pub patient_class: PatientClass,
    /// Unit currently responsible for the patient
    pub location: Option<String>,
    movements: Vec<Movement>,
    /// Committed version; 0 until first stored
    pub version: u64,
}

impl Encounter {
    /// Creates an encounter with no movements yet
    pub fn new(
        identifier: EncounterIdentifier,
        patient_id: EntityId,
        patient_identifier: PatientIdentifier,
    ) -> Self {
        Self {
            id: EntityId::new(),
            identifier,
            patient_id,
            patient_identifier,
            current_state: EncounterState::NoEncounter,
            patient_class: PatientClass::default(),
            location: None,
            movements: Vec::new(),
            version: 0,
        }
    }

    pub fn movements(&self) -> &[Movement] {
        &self.movements
    }

    pub fn last_movement(&self) -> Option<&Movement> {
        self.movements.last()
    }

    /// Workflow position derived from the movement history
    pub fn workflow(&self) -> Result<EncounterWorkflow, TransitionError> {
        EncounterWorkflow::replay(
            self.movements
                .iter()
                .map(|m| (&m.trigger, m.patient_class)),
        )
    }

    /// Checks the movement against the workflow and appends it.
    ///
    /// On error the encounter is left untouched.
    pub fn append_movement(&mut self, mut movement: Movement) -> Result<Movement, TransitionError> {
        let mut workflow = self.workflow()?;
        let step = workflow.apply(&movement.trigger, movement.patient_class)?;

        movement.encounter_id = self.id;
        movement.sequence = self.movements.len() as u32 + 1;
        movement.version = 1;

        if let Step::Moved { .. } = step {
            self.patient_class = movement.patient_class;
        }
        if movement.responsible_unit.is_some() {
            self.location = movement.responsible_unit.clone();
        }
        self.current_state = step.state();
        self.movements.push(movement.clone());
        Ok(movement)
    }
}
