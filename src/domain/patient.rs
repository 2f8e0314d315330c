//! Patient domain model

use super::ids::{EntityId, PatientIdentifier};
use serde::{Deserialize, Serialize};

/// A patient known to the bridge, keyed by its primary PID-3 identifier
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Patient {
    pub id: EntityId,

    /// Primary business identifier
    pub identifier: PatientIdentifier,

    /// Assigning authority of the primary identifier (PID-3.4)
    pub assigning_authority: Option<String>,

    pub family_name: String,
    pub given_name: Option<String>,

    /// Birth date as received (HL7 DTM, usually YYYYMMDD)
    pub birth_date: Option<String>,

    /// Administrative sex (HL7 table 0001)
    pub sex: Option<String>,

    /// Committed version; 0 until first stored
    pub version: u64,
}

impl Patient {
    /// Creates a new, not yet stored patient
    pub fn new(identifier: PatientIdentifier, family_name: impl Into<String>) -> Self {
        Self {
            id: EntityId::new(),
            identifier,
            assigning_authority: None,
            family_name: family_name.into(),
            given_name: None,
            birth_date: None,
            sex: None,
            version: 0,
        }
    }

    /// Copies demographics from `other`, keeping identity and version.
    /// Returns true when anything changed.
    pub fn merge_demographics(&mut self, other: &Patient) -> bool {
        let before = self.clone();
        if !other.family_name.is_empty() {
            self.family_name = other.family_name.clone();
        }
        if other.given_name.is_some() {
            self.given_name = other.given_name.clone();
        }
        if other.birth_date.is_some() {
            self.birth_date = other.birth_date.clone();
        }
        if other.sex.is_some() {
            self.sex = other.sex.clone();
        }
        if other.assigning_authority.is_some() {
            self.assigning_authority = other.assigning_authority.clone();
        }
        *self != before
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient(family: &str) -> Patient {
        Patient::new(PatientIdentifier::new("12345").unwrap(), family)
    }

    #[test]
    fn test_new_patient_is_unversioned() {
        let p = patient("DOE");
        assert_eq!(p.version, 0);
        assert_eq!(p.family_name, "DOE");
    }

    #[test]
    fn test_merge_demographics_reports_change() {
        let mut stored = patient("DOE");
        stored.version = 3;
        let mut incoming = patient("SMITH");
        incoming.sex = Some("F".to_string());

        assert!(stored.merge_demographics(&incoming));
        assert_eq!(stored.family_name, "SMITH");
        assert_eq!(stored.sex.as_deref(), Some("F"));
        assert_eq!(stored.version, 3);
        assert_ne!(stored.id, incoming.id);
    }

    #[test]
    fn test_merge_demographics_no_change() {
        let mut stored = patient("DOE");
        let incoming = patient("DOE");
        assert!(!stored.merge_demographics(&incoming));
    }
}
