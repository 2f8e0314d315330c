//! Encounter workflow
//!
//! The state machine is enforced twice: at the point of mutation, when a
//! movement is appended to an encounter, and over a whole message sequence by
//! the scenario check.

pub mod machine;
pub mod scenario;
pub mod state;

pub use machine::{forward_target, EncounterWorkflow, Step};
pub use scenario::{check_scenario, split_messages, ScenarioReport};
pub use state::EncounterState;
