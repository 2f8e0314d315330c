//! Endpoint model
//!
//! An endpoint is an external system we receive from, send to, or both.
//! Endpoints are declared in the `[[endpoints]]` configuration array.

use super::events::EntityKind;
use super::ids::EndpointId;
use serde::{Deserialize, Serialize};

/// Direction(s) an endpoint participates in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointRole {
    /// We receive messages from it
    Receiver,
    /// We emit messages to it
    Sender,
    Both,
}

impl EndpointRole {
    pub fn emits(&self) -> bool {
        matches!(self, EndpointRole::Sender | EndpointRole::Both)
    }

    pub fn receives(&self) -> bool {
        matches!(self, EndpointRole::Receiver | EndpointRole::Both)
    }
}

/// What to do with a message whose validation level is `fail`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationMode {
    /// Log issues and keep processing
    #[default]
    Warn,
    /// Answer AE and apply no mutation
    Reject,
}

/// Transport used to reach an endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EndpointTransport {
    /// HL7 v2 over MLLP
    Mllp {
        host: String,
        port: u16,
    },
    /// FHIR-shaped JSON over HTTP
    FhirHttp { base_url: String },
}

/// A configured external system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: EndpointId,

    #[serde(default)]
    pub name: String,

    pub role: EndpointRole,

    #[serde(default = "default_enabled")]
    pub enabled: bool,

    pub transport: EndpointTransport,

    /// Validation profile applied to messages received from this endpoint
    #[serde(default = "default_profile")]
    pub validation_profile: String,

    #[serde(default)]
    pub validation_mode: ValidationMode,

    /// Entity kinds emitted to this endpoint; empty means all
    #[serde(default)]
    pub scope: Vec<EntityKind>,

    /// Inbound traffic on this endpoint echoes our own emissions
    #[serde(default)]
    pub loopback: bool,

    /// Overrides the global delivery timeout
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
}

fn default_enabled() -> bool {
    true
}

fn default_profile() -> String {
    "base".to_string()
}

impl Endpoint {
    /// True when changes to `kind` must be emitted to this endpoint
    pub fn accepts(&self, kind: EntityKind) -> bool {
        self.enabled && self.role.emits() && (self.scope.is_empty() || self.scope.contains(&kind))
    }

    /// True when an inbound MSH-3 sending application names this endpoint
    pub fn matches_sender(&self, sending_application: &str) -> bool {
        let app = sending_application.trim();
        !app.is_empty()
            && self.enabled
            && self.role.receives()
            && (self.id.as_str().eq_ignore_ascii_case(app) || self.name.eq_ignore_ascii_case(app))
    }

    /// Human-readable peer address for logs
    pub fn peer(&self) -> String {
        match &self.transport {
            EndpointTransport::Mllp { host, port } => format!("{host}:{port}"),
            EndpointTransport::FhirHttp { base_url } => base_url.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        EndpointId::new(self.id.as_str())?;
        match &self.transport {
            EndpointTransport::Mllp { host, port } => {
                if host.trim().is_empty() {
                    return Err(format!("endpoint {}: host cannot be empty", self.id));
                }
                if *port == 0 {
                    return Err(format!("endpoint {}: port must be greater than 0", self.id));
                }
            }
            EndpointTransport::FhirHttp { base_url } => {
                let parsed = url::Url::parse(base_url)
                    .map_err(|e| format!("endpoint {}: invalid base_url: {e}", self.id))?;
                if !matches!(parsed.scheme(), "http" | "https") {
                    return Err(format!(
                        "endpoint {}: base_url must use http or https",
                        self.id
                    ));
                }
            }
        }
        if let Some(0) = self.timeout_seconds {
            return Err(format!(
                "endpoint {}: timeout_seconds must be greater than 0",
                self.id
            ));
        }
        Ok(())
    }
}
