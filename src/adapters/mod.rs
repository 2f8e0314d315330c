//! Storage integrations for medbridge.
//!
//! This module provides the persistence boundary and its backends:
//!
//! - [`database`] - Storage abstraction layer (trait-based) and factory
//! - [`memory`] - Process-local store for tests and single-node trials
//! - [`postgresql`] - PostgreSQL implementation
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern** to isolate external dependencies and
//! enable testing without a database. The pipeline only ever sees
//! `Arc<dyn Store>`.
//!
//! ```rust
//! use medbridge::adapters::database::{MessageQuery, Store};
//! use medbridge::adapters::memory::InMemoryStore;
//! use medbridge::domain::RawMessage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = InMemoryStore::new();
//! store.record_message(&RawMessage::inbound("MSH|^~\\&|HIS", None)).await?;
//!
//! let messages = store.list_messages(&MessageQuery::default()).await?;
//! assert_eq!(messages.len(), 1);
//! # Ok(())
//! # }
//! ```

pub mod database;
pub mod memory;
pub mod postgresql;
