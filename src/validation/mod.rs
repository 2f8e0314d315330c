//! Message validation
//!
//! Four ordered layers, each independently testable:
//!
//! 1. [`profile`]: site-mandated and site-forbidden segments per trigger
//! 2. [`structural`]: relative order of known segments
//! 3. [`base`]: required fields, coded values and header/event coherence
//! 4. [`datatypes`]: components of composite fields, per repetition
//!
//! The aggregated [`ValidationResult`] level is `fail` if any issue is an
//! error, `warn` if any is a warning, `ok` otherwise.

pub mod base;
pub mod datatypes;
pub mod engine;
pub mod issue;
pub mod profile;
pub mod structural;

pub use engine::{validate_with, ValidationEngine};
pub use issue::{Severity, ValidationIssue, ValidationLevel, ValidationResult};
pub use profile::{ProfileRegistry, ProfileRule, ValidationProfile, BASE_PROFILE, PAM_PROFILE};
