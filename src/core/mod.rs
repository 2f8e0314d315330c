//! Core processing for medbridge.
//!
//! # Modules
//!
//! - [`ingest`] - Inbound pipeline: parse, validate, acknowledge, apply, emit
//! - [`server`] - MLLP listener feeding every connection into the pipeline
//!
//! # Inbound Workflow
//!
//! 1. **Frame**: the listener decodes one MLLP frame (`AR` on a bad envelope)
//! 2. **Validate**: the message is checked against its endpoint's profile
//! 3. **Record**: the raw text is stored with its validation result
//! 4. **Apply**: the message becomes a change set, checked by the workflow
//! 5. **Commit**: the store commits and returns domain events
//! 6. **Emit**: the router dispatches the events to sender endpoints
//! 7. **Acknowledge**: `AA`, `AE` or `AR` goes back on the connection
//!
//! # Example
//!
//! ```rust,no_run
//! use medbridge::adapters::database::create_store;
//! use medbridge::config::load_config;
//! use medbridge::core::ingest::InboundProcessor;
//! use medbridge::core::server::MllpServer;
//! use medbridge::emission::EmissionRouter;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("medbridge.toml")?;
//! let store = create_store(&config).await?;
//! let router = Arc::new(EmissionRouter::from_config(&config, store.clone())?);
//! let processor = Arc::new(InboundProcessor::new(&config, store, router));
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let server = MllpServer::bind(&config.listener, processor).await?;
//! let summary = server.run(shutdown_rx).await?;
//!
//! println!("Messages: {}", summary.messages);
//! # Ok(())
//! # }
//! ```

pub mod ingest;
pub mod server;
