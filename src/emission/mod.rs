//! Outbound emission
//!
//! After a change set commits, the router turns each domain event into one
//! outbound message per interested endpoint:
//!
//! - [`triggers`] maps `(entity kind, operation)` to the outbound trigger
//! - [`payload`] renders the entity as HL7 v2 or a FHIR-shaped bundle
//! - [`delivery`] sends it over MLLP or HTTP and reads the acknowledgement
//! - [`router`] claims the emission key, queues the delivery and records the
//!   outcome
//!
//! # Example
//!
//! ```no_run
//! use medbridge::adapters::memory::InMemoryStore;
//! use medbridge::adapters::database::Store;
//! use medbridge::domain::MutationContext;
//! use medbridge::emission::EmissionRouter;
//! use std::sync::Arc;
//!
//! # async fn example(events: Vec<medbridge::domain::DomainEvent>) -> medbridge::domain::Result<()> {
//! let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
//! let router = EmissionRouter::builder(store).build()?;
//!
//! let report = router.on_commit(&events, &MutationContext::local()).await?;
//! for (key, outcome) in report.wait().await {
//!     println!("{key}: {:?}", outcome.status());
//! }
//! router.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod delivery;
pub mod payload;
pub mod router;
pub mod triggers;

pub use delivery::{deliverer_for, Deliverer, DeliveryResponse, FhirHttpDeliverer, MllpDeliverer};
pub use payload::{transform_for, FhirTransform, Hl7v2Transform, OutboundPayload, PayloadTransform};
pub use router::{DispatchReport, EmissionRouter, EmissionRouterBuilder, QueuedEmission};
pub use triggers::{outbound_trigger, resolve, Resolution};
