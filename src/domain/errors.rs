//! Domain error types
//!
//! This module defines the error hierarchy for medbridge. Each failure family
//! of the pipeline has its own type so that callers can tell a framing fault
//! from a workflow rejection or a delivery failure. None of them expose
//! third-party types.

use thiserror::Error;

/// Main medbridge error type
///
/// This is the primary error type used throughout the application.
/// It wraps the specific error families and provides context for error handling.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Wire framing errors
    #[error("Framing error: {0}")]
    Frame(#[from] FrameError),

    /// HL7 parsing errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Encounter workflow violations
    #[error("Workflow error: {0}")]
    Transition(#[from] TransitionError),

    /// Outbound delivery errors
    #[error("Delivery error: {0}")]
    Delivery(#[from] DeliveryError),

    /// Persistence errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Payload construction errors
    #[error("Transform error: {0}")]
    Transform(String),

    /// Network/connection errors
    #[error("Connection error: {0}")]
    Connection(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Wire framing errors
///
/// A framing error means the bytes on the wire could not be delimited into a
/// message. It never reaches validation and never produces a domain mutation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FrameError {
    /// Bytes were received outside of a start/end envelope
    #[error("{discarded} byte(s) received outside of a frame")]
    MissingStartByte { discarded: usize },

    /// A new start byte arrived before the current frame was terminated
    #[error("frame truncated after {received} byte(s)")]
    Truncated { received: usize },

    /// The end byte was not followed by a carriage return
    #[error("end byte not followed by carriage return")]
    MissingTrailer,

    /// The frame exceeded the configured maximum size
    #[error("frame exceeds {limit} bytes")]
    Oversized { limit: usize },

    /// The connection closed in the middle of a frame
    #[error("connection closed with {pending} byte(s) of an unterminated frame")]
    UnexpectedEof { pending: usize },

    /// Outbound text contains an envelope control byte
    #[error("message text contains envelope control byte 0x{0:02X}")]
    ControlByteInPayload(u8),
}

/// HL7 parsing errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Empty input
    #[error("message is empty")]
    Empty,

    /// First segment is not MSH
    #[error("message must start with an MSH segment")]
    MissingHeader,

    /// MSH segment too short to carry separators
    #[error("MSH segment too short to read encoding characters")]
    InvalidEncodingCharacters,

    /// A segment identifier is malformed
    #[error("invalid segment identifier: {0}")]
    InvalidSegment(String),
}

/// Encounter workflow violation
///
/// Raised when a movement's trigger is not an allowed transition from the
/// encounter's current state. Fatal to that mutation only.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    /// The (state, trigger) pair is not in the allow-list
    #[error("trigger {trigger} is not allowed in state {state}")]
    NotAllowed { state: String, trigger: String },

    /// The trigger requires an existing encounter and none was found
    #[error("trigger {trigger} requires an existing encounter ({encounter})")]
    UnknownEncounter { trigger: String, encounter: String },

    /// A cancellation had no movement left to cancel
    #[error("trigger {trigger} has nothing to cancel")]
    NothingToCancel { trigger: String },
}

/// Outbound delivery errors
///
/// Fatal to one delivery only; recorded on the emission record and never
/// propagated back into the inbound pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Failed to connect to the peer
    #[error("failed to connect to {peer}: {reason}")]
    ConnectionFailed { peer: String, reason: String },

    /// I/O failure while writing or reading
    #[error("I/O failure talking to {peer}: {reason}")]
    Io { peer: String, reason: String },

    /// The peer closed the connection without replying
    #[error("peer {0} closed the connection without acknowledging")]
    NoAcknowledgement(String),

    /// The peer answered with a negative acknowledgement
    #[error("peer rejected the message: {0}")]
    Rejected(String),

    /// The peer replied with something that is not an acknowledgement
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    /// The delivery did not complete within the configured timeout
    #[error("delivery timed out after {0} second(s)")]
    Timeout(u64),

    /// The endpoint cannot be delivered to with its current configuration
    #[error("endpoint misconfigured: {0}")]
    Misconfigured(String),
}

/// Persistence errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// Optimistic version check failed
    #[error("version conflict on {entity}: expected {expected}, found {found}")]
    VersionConflict {
        entity: String,
        expected: u64,
        found: u64,
    },

    /// Entity not found
    #[error("entity not found: {0}")]
    NotFound(String),

    /// Unique constraint violated on insert
    #[error("duplicate entity: {0}")]
    Duplicate(String),

    /// Backend failure
    #[error("backend failure: {0}")]
    Backend(String),
}

// Conversion from std::io::Error
impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        BridgeError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for BridgeError {
    fn from(err: serde_json::Error) -> Self {
        BridgeError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        BridgeError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        let err = BridgeError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_frame_error_conversion() {
        let err: BridgeError = FrameError::MissingTrailer.into();
        assert!(matches!(err, BridgeError::Frame(_)));
        assert!(err.to_string().contains("carriage return"));
    }

    #[test]
    fn test_transition_error_conversion() {
        let transition = TransitionError::NotAllowed {
            state: "discharged".to_string(),
            trigger: "A02".to_string(),
        };
        let err: BridgeError = transition.into();
        assert!(matches!(err, BridgeError::Transition(_)));
        assert_eq!(
            err.to_string(),
            "Workflow error: trigger A02 is not allowed in state discharged"
        );
    }

    #[test]
    fn test_delivery_error_display() {
        let err = DeliveryError::Timeout(30);
        assert_eq!(err.to_string(), "delivery timed out after 30 second(s)");
    }

    #[test]
    fn test_store_version_conflict_display() {
        let err = StoreError::VersionConflict {
            entity: "patient/42".to_string(),
            expected: 2,
            found: 3,
        };
        assert!(err.to_string().contains("expected 2, found 3"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: BridgeError = io_err.into();
        assert!(matches!(err, BridgeError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: BridgeError = json_err.into();
        assert!(matches!(err, BridgeError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: BridgeError = toml_err.into();
        assert!(matches!(err, BridgeError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }
}
