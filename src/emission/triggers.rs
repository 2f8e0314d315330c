//! Outbound trigger resolution
//!
//! Every committed mutation is looked up in one table keyed by entity kind and
//! operation. The match is exhaustive: adding an entity kind or an operation
//! does not compile until its row is written here.

use crate::domain::events::{DomainEntity, EntityKind, Operation};
use crate::hl7::TriggerEvent;

/// What the table says about one `(kind, operation)` pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Emit this fixed trigger
    Fixed(TriggerEvent),
    /// Emit the trigger recorded on the movement itself
    MovementTrigger,
    /// Nothing is emitted for this mutation
    NotEmitted,
}

/// The resolution table
pub fn resolve(kind: EntityKind, operation: Operation) -> Resolution {
    match (kind, operation) {
        (EntityKind::Patient, Operation::Insert) => Resolution::Fixed(TriggerEvent::A28),
        (EntityKind::Patient, Operation::Update) => Resolution::Fixed(TriggerEvent::A31),
        (EntityKind::Movement, Operation::Insert) => Resolution::MovementTrigger,
        // Movements are immutable once appended
        (EntityKind::Movement, Operation::Update) => Resolution::NotEmitted,
        // Encounter rows change alongside a movement, which is emitted instead
        (EntityKind::Encounter, Operation::Insert) => Resolution::NotEmitted,
        (EntityKind::Encounter, Operation::Update) => Resolution::NotEmitted,
    }
}

/// Outbound trigger for a committed mutation of `entity`
///
/// Returns `None` when the table says nothing is emitted, or when the snapshot
/// does not match the event kind.
pub fn outbound_trigger(entity: &DomainEntity, operation: Operation) -> Option<TriggerEvent> {
    match (resolve(entity.kind(), operation), entity) {
        (Resolution::Fixed(trigger), _) => Some(trigger),
        (Resolution::MovementTrigger, DomainEntity::Movement { movement, .. }) => {
            Some(movement.trigger.clone())
        }
        (Resolution::MovementTrigger, _) | (Resolution::NotEmitted, _) => None,
    }
}

/// True when mutations of this kind and operation can produce an emission
pub fn is_emitted(kind: EntityKind, operation: Operation) -> bool {
    !matches!(resolve(kind, operation), Resolution::NotEmitted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::encounter::{Encounter, Movement};
    use crate::domain::ids::{EncounterIdentifier, PatientIdentifier};
    use crate::domain::patient::Patient;
    use test_case::test_case;

    #[test_case(EntityKind::Patient, Operation::Insert, Resolution::Fixed(TriggerEvent::A28) ; "new patient registers")]
    #[test_case(EntityKind::Patient, Operation::Update, Resolution::Fixed(TriggerEvent::A31) ; "patient update")]
    #[test_case(EntityKind::Movement, Operation::Insert, Resolution::MovementTrigger ; "new movement")]
    #[test_case(EntityKind::Movement, Operation::Update, Resolution::NotEmitted ; "movement update")]
    #[test_case(EntityKind::Encounter, Operation::Insert, Resolution::NotEmitted ; "encounter insert")]
    #[test_case(EntityKind::Encounter, Operation::Update, Resolution::NotEmitted ; "encounter update")]
    fn test_resolution_table(kind: EntityKind, operation: Operation, expected: Resolution) {
        assert_eq!(resolve(kind, operation), expected);
    }

    #[test]
    fn test_patient_update_never_uses_register_trigger() {
        let patient = Patient::new(PatientIdentifier::new("1").unwrap(), "DOE");
        let entity = DomainEntity::Patient(patient);
        assert_eq!(outbound_trigger(&entity, Operation::Update), Some(TriggerEvent::A31));
        assert_eq!(outbound_trigger(&entity, Operation::Insert), Some(TriggerEvent::A28));
    }

    #[test]
    fn test_movement_trigger_is_preserved() {
        let patient = Patient::new(PatientIdentifier::new("1").unwrap(), "DOE");
        let mut encounter = Encounter::new(
            EncounterIdentifier::new("V1").unwrap(),
            patient.id,
            patient.identifier.clone(),
        );
        encounter
            .append_movement(Movement::builder().trigger(TriggerEvent::A01).build().unwrap())
            .unwrap();
        let movement = encounter
            .append_movement(Movement::builder().trigger(TriggerEvent::A21).build().unwrap())
            .unwrap();
        let entity = DomainEntity::Movement {
            movement,
            encounter,
            patient,
        };
        assert_eq!(outbound_trigger(&entity, Operation::Insert), Some(TriggerEvent::A21));
        assert_eq!(outbound_trigger(&entity, Operation::Update), None);
        assert!(!is_emitted(EntityKind::Encounter, Operation::Update));
    }
}
