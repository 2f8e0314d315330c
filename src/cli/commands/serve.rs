//! Serve command implementation
//!
//! This module implements the `serve` command: it wires storage, the emission
//! router and the inbound pipeline together and runs the MLLP listener until
//! a shutdown signal arrives.

use crate::adapters::database::create_store;
use crate::config::load_config;
use crate::core::ingest::InboundProcessor;
use crate::core::server::MllpServer;
use crate::emission::EmissionRouter;
use clap::Args;
use std::sync::Arc;
use tokio::sync::watch;

/// Arguments for the serve command
#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Override the listener port
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Override the listener bind address
    #[arg(long)]
    pub bind: Option<String>,
}

impl ServeArgs {
    /// Execute the serve command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!("Starting serve command");

        let mut config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                eprintln!("❌ {e}");
                return Ok(2); // Configuration error exit code
            }
        };
        if let Some(port) = self.port {
            config.listener.port = port;
        }
        if let Some(bind) = &self.bind {
            config.listener.bind_address = bind.clone();
        }

        let store = match create_store(&config).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to open storage");
                eprintln!("Failed to open storage: {e}");
                return Ok(4); // Connection error exit code
            }
        };

        let router = match EmissionRouter::from_config(&config, store.clone()) {
            Ok(r) => Arc::new(r),
            Err(e) => {
                tracing::error!(error = %e, "Failed to start emission router");
                eprintln!("Failed to start emission router: {e}");
                return Ok(2);
            }
        };
        let processor = Arc::new(InboundProcessor::new(&config, store.clone(), router.clone()));

        let server = match MllpServer::bind(&config.listener, processor).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Failed to start listener");
                eprintln!("Failed to start listener: {e}");
                return Ok(4);
            }
        };

        println!("🚀 medbridge listening on {}", server.local_addr()?);
        println!("  Storage: {}", store.backend_name());
        for endpoint in router.targets() {
            println!("  Emitting to: {} ({})", endpoint.id, endpoint.peer());
        }
        println!();

        let summary = match server.run(shutdown_signal).await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!(error = %e, "Listener failed");
                eprintln!("Listener failed: {e}");
                return Ok(5); // Fatal error exit code
            }
        };

        // The listener held the last other reference through the processor
        match Arc::try_unwrap(router) {
            Ok(router) => router.shutdown().await,
            Err(_) => tracing::warn!("Emission router still in use, not waiting for deliveries"),
        }

        println!();
        println!("📊 Session Summary:");
        println!("  Connections: {}", summary.connections);
        println!("  Messages: {}", summary.messages);
        println!("  Frame Errors: {}", summary.frame_errors);
        println!();
        println!("✅ medbridge stopped");

        Ok(0)
    }
}
