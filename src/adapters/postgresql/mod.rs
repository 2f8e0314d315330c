//! PostgreSQL storage backend
//!
//! Entities and raw messages are kept as JSONB documents next to the columns
//! used for lookups. Emission records carry the uniqueness constraint that
//! makes claiming atomic.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgresStore;
pub use client::PostgreSQLClient;
