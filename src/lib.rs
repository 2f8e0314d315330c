// medbridge - HL7 v2 ADT Bridge
// Copyright (c) 2025 medbridge Contributors
// Licensed under the MIT License

//! # medbridge - HL7 v2 ADT Bridge
//!
//! medbridge receives HL7 v2.5 patient administration (ADT) messages over
//! MLLP, validates them, applies them to patients and encounters under a
//! workflow state machine, and re-emits every committed change to the
//! downstream systems that subscribe to it.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Framing** messages with MLLP and answering `AA`/`AE`/`AR` acknowledgements
//! - **Validating** messages in four layers (profile, structure, base standard, datatypes)
//! - **Enforcing** the encounter workflow, per message and over whole scenarios
//! - **Emitting** committed changes to sender endpoints, at most once per change
//!
//! ## Architecture
//!
//! medbridge follows a layered architecture:
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Inbound pipeline and MLLP listener
//! - [`emission`] - Trigger resolution, payload transforms, delivery, router
//! - [`validation`] - The four-layer validation engine
//! - [`workflow`] - Encounter state machine and scenario checks
//! - [`transport`] - MLLP codec and acknowledgements
//! - [`hl7`] - HL7 v2 parser and trigger events
//! - [`adapters`] - Storage backends (memory, PostgreSQL)
//! - [`domain`] - Core domain types and models
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging and observability
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use medbridge::hl7::Message;
//! use medbridge::validation::ValidationEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let text = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20240101120000||ADT^A01^ADT_A01|MSG1|P|2.5\r\
//! EVN|A01|20240101120000\r\
//! PID|||12345^^^HOSP^PI||DOE^JOHN||19800101|M\r\
//! PV1||I|CARDIO^101^A||||||||||||||||V0001\r";
//!
//! let message = Message::parse(text)?;
//! let result = ValidationEngine::default().validate(&message, "base");
//! println!("{}: {} issue(s)", result.level, result.issues.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! medbridge uses the [`domain::BridgeError`] type for all errors:
//!
//! ```rust,no_run
//! use medbridge::domain::BridgeError;
//!
//! fn example() -> Result<(), BridgeError> {
//!     // Errors are automatically converted using the ? operator
//!     let config = medbridge::config::load_config("medbridge.toml")?;
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod emission;
pub mod hl7;
pub mod logging;
pub mod transport;
pub mod validation;
pub mod workflow;
