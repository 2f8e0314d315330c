//! Storage abstraction layer
//!
//! This module provides the trait-based persistence boundary, allowing
//! medbridge to run against different backends (in-memory, PostgreSQL).

pub mod factory;
pub mod traits;

pub use factory::create_store;
pub use traits::{next_version, MessageQuery, Store};
