//! Encounter state machine
//!
//! Transitions are an explicit allow-list keyed by `(state, trigger)`; any
//! pair not listed is refused. Cancellation triggers undo the most recent
//! movement they cancel, restoring the state that movement left. State is
//! always derived by replaying movements in order.

use super::state::EncounterState;
use crate::domain::encounter::PatientClass;
use crate::domain::errors::TransitionError;
use crate::hl7::TriggerEvent;

/// Outcome of applying one trigger
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// The trigger moved the encounter (possibly to the same state)
    Moved {
        from: EncounterState,
        to: EncounterState,
    },
    /// The trigger is neutral for the encounter lifecycle
    Unchanged(EncounterState),
}

impl Step {
    /// State after the step
    pub fn state(&self) -> EncounterState {
        match self {
            Step::Moved { to, .. } => *to,
            Step::Unchanged(state) => *state,
        }
    }
}

/// Forward (non-cancelling) allow-list
pub fn forward_target(
    state: EncounterState,
    trigger: &TriggerEvent,
    class: PatientClass,
) -> Option<EncounterState> {
    use EncounterState::*;

    match (state, trigger) {
        (NoEncounter, TriggerEvent::A05) => Some(if class.is_outpatient() {
            PreAdmittedOutpatient
        } else {
            PreAdmittedInpatient
        }),
        (NoEncounter | PreAdmittedInpatient | PreAdmittedOutpatient, TriggerEvent::A01) => {
            Some(Admitted)
        }
        (NoEncounter | PreAdmittedOutpatient, TriggerEvent::A04) => Some(Outpatient),
        (Admitted, TriggerEvent::A02) => Some(Admitted),
        (Outpatient, TriggerEvent::A06) => Some(Admitted),
        (Admitted, TriggerEvent::A07) => Some(Outpatient),
        (Admitted, TriggerEvent::A21) => Some(OnLeave),
        (OnLeave, TriggerEvent::A22) => Some(Admitted),
        (Admitted | Outpatient, TriggerEvent::A03) => Some(Discharged),
        (current, TriggerEvent::A54) if current.is_active() => Some(current),
        _ => None,
    }
}

/// Running workflow of one encounter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EncounterWorkflow {
    state: EncounterState,
    /// Applied movements with the state each one left behind
    history: Vec<(TriggerEvent, EncounterState)>,
}

impl EncounterWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> EncounterState {
        self.state
    }

    /// Rebuilds the workflow by folding movements in order
    pub fn replay<'a, I>(movements: I) -> Result<Self, TransitionError>
    where
        I: IntoIterator<Item = (&'a TriggerEvent, PatientClass)>,
    {
        let mut workflow = Self::new();
        for (trigger, class) in movements {
            workflow.apply(trigger, class)?;
        }
        Ok(workflow)
    }

    /// Applies a trigger, refusing pairs outside the allow-list
    pub fn apply(
        &mut self,
        trigger: &TriggerEvent,
        class: PatientClass,
    ) -> Result<Step, TransitionError> {
        if trigger.is_identity_only() {
            return Ok(Step::Unchanged(self.state));
        }

        if *trigger == TriggerEvent::A08 {
            if self.state.is_active() {
                return Ok(Step::Unchanged(self.state));
            }
            return Err(self.not_allowed(trigger));
        }

        let from = self.state;

        if let Some(cancelled) = trigger.cancels() {
            if from == EncounterState::Cancelled {
                return Err(self.not_allowed(trigger));
            }
            let restored = match self.history.last() {
                None => {
                    return Err(TransitionError::NothingToCancel {
                        trigger: trigger.code().to_string(),
                    })
                }
                Some((last, previous)) if cancelled.contains(last) => *previous,
                Some(_) => return Err(self.not_allowed(trigger)),
            };
            self.history.pop();
            let to = if restored == EncounterState::NoEncounter {
                EncounterState::Cancelled
            } else {
                restored
            };
            self.state = to;
            return Ok(Step::Moved { from, to });
        }

        let to = forward_target(from, trigger, class).ok_or_else(|| self.not_allowed(trigger))?;
        self.history.push((trigger.clone(), from));
        self.state = to;
        Ok(Step::Moved { from, to })
    }

    /// State the trigger would lead to, without applying it
    pub fn check(
        &self,
        trigger: &TriggerEvent,
        class: PatientClass,
    ) -> Result<EncounterState, TransitionError> {
        let mut trial = self.clone();
        trial.apply(trigger, class).map(|step| step.state())
    }

    /// Known triggers accepted from the current position
    pub fn allowed_triggers(&self) -> Vec<TriggerEvent> {
        TriggerEvent::KNOWN
            .iter()
            .filter(|t| self.check(t, PatientClass::Inpatient).is_ok())
            .cloned()
            .collect()
    }

    fn not_allowed(&self, trigger: &TriggerEvent) -> TransitionError {
        TransitionError::NotAllowed {
            state: self.state.to_string(),
            trigger: trigger.code().to_string(),
        }
    }
}
