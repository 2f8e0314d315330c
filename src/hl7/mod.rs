//! HL7 v2 message handling
//!
//! Parsing, header extraction, trigger events and timestamp handling shared by
//! validation, workflow mapping and payload construction.

pub mod datetime;
pub mod message;
pub mod trigger;

pub use datetime::{format_timestamp, parse_to_utc, Hl7Timestamp, TimestampError};
pub use message::{new_control_id, split_components, Message, MessageHeader, Segment, Separators};
pub use trigger::TriggerEvent;
