//! Domain models and types for medbridge.
//!
//! This module contains the entities the bridge maintains, the messages and
//! emission records it persists, and the error taxonomy shared by every layer.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Strongly-typed identifiers** ([`EndpointId`], [`PatientIdentifier`], [`EncounterIdentifier`], [`EntityId`])
//! - **Entities** ([`Patient`], [`Encounter`], [`Movement`])
//! - **Records** ([`RawMessage`], [`EmissionRecord`])
//! - **Domain events** ([`DomainEvent`], [`ChangeSet`], [`MutationContext`])
//! - **Error types** ([`BridgeError`], [`FrameError`], [`TransitionError`], [`DeliveryError`])
//!
//! # Encounters
//!
//! Encounters only change by appending movements. The workflow check runs at
//! the point of mutation:
//!
//! ```rust
//! use medbridge::domain::{Encounter, EncounterIdentifier, EntityId, Movement, PatientIdentifier};
//! use medbridge::hl7::TriggerEvent;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut encounter = Encounter::new(
//!     EncounterIdentifier::new("V001")?,
//!     EntityId::new(),
//!     PatientIdentifier::new("12345")?,
//! );
//! encounter.append_movement(Movement::builder().trigger(TriggerEvent::A01).build()?)?;
//!
//! // A return from leave is refused while admitted
//! let refused = encounter.append_movement(Movement::builder().trigger(TriggerEvent::A22).build()?);
//! assert!(refused.is_err());
//! # Ok(())
//! # }
//! ```

pub mod emission;
pub mod encounter;
pub mod endpoint;
pub mod errors;
pub mod events;
pub mod ids;
pub mod message;
pub mod patient;
pub mod result;

// Re-export commonly used types for convenience
pub use emission::{EmissionKey, EmissionOutcome, EmissionRecord, EmissionStatus};
pub use encounter::{Encounter, Movement, MovementBuilder, PatientClass};
pub use endpoint::{Endpoint, EndpointRole, EndpointTransport, ValidationMode};
pub use errors::{
    BridgeError, DeliveryError, FrameError, ParseError, StoreError, TransitionError,
};
pub use events::{
    Change, ChangeSet, DomainEntity, DomainEvent, EntityKind, MutationContext, Operation, Origin,
};
pub use ids::{EncounterIdentifier, EndpointId, EntityId, PatientIdentifier};
pub use message::{Direction, MessageFate, MessageKind, RawMessage};
pub use patient::Patient;
pub use result::Result;
