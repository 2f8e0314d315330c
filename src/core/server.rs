//! MLLP listener
//!
//! One task per connection. Within a connection frames are processed strictly
//! in arrival order and each is answered before the next is read. A shutdown
//! signal stops the accept loop; open connections finish the message in hand
//! and close.

use crate::config::schema::ListenerConfig;
use crate::core::ingest::InboundProcessor;
use crate::domain::{BridgeError, Result};
use crate::transport::MllpCodec;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio_util::codec::Framed;

/// Counters reported when the listener stops
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerSummary {
    pub connections: u64,
    pub messages: u64,
    pub frame_errors: u64,
}

#[derive(Default)]
struct Counters {
    messages: AtomicU64,
    frame_errors: AtomicU64,
}

/// Accepts MLLP connections and feeds them to the inbound pipeline
pub struct MllpServer {
    listener: TcpListener,
    processor: Arc<InboundProcessor>,
    max_frame_bytes: usize,
    idle_timeout: Option<Duration>,
}

impl MllpServer {
    /// Binds the configured address
    ///
    /// # Errors
    ///
    /// Returns `BridgeError::Connection` if the address cannot be bound.
    pub async fn bind(config: &ListenerConfig, processor: Arc<InboundProcessor>) -> Result<Self> {
        let address = config.socket_address();
        let listener = TcpListener::bind(&address)
            .await
            .map_err(|e| BridgeError::Connection(format!("Failed to bind {address}: {e}")))?;

        Ok(Self {
            listener,
            processor,
            max_frame_bytes: config.max_frame_bytes,
            idle_timeout: (config.idle_timeout_seconds > 0)
                .then(|| Duration::from_secs(config.idle_timeout_seconds)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(BridgeError::from)
    }

    /// Serves until the shutdown signal flips to `true`
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<ServerSummary> {
        let counters = Arc::new(Counters::default());
        let mut connections = JoinSet::new();
        let mut accepted = 0u64;

        tracing::info!(address = %self.local_addr()?, "MLLP listener started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                incoming = self.listener.accept() => {
                    let (stream, peer) = match incoming {
                        Ok(incoming) => incoming,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    accepted += 1;
                    tracing::info!(peer = %peer, "Connection accepted");

                    let connection = Connection {
                        processor: self.processor.clone(),
                        counters: counters.clone(),
                        max_frame_bytes: self.max_frame_bytes,
                        idle_timeout: self.idle_timeout,
                        peer,
                    };
                    connections.spawn(connection.serve(stream, shutdown.clone()));
                }
            }
        }

        tracing::info!(
            open_connections = connections.len(),
            "Shutdown requested, waiting for open connections"
        );
        while let Some(joined) = connections.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Connection task panicked");
            }
        }

        let summary = ServerSummary {
            connections: accepted,
            messages: counters.messages.load(Ordering::Relaxed),
            frame_errors: counters.frame_errors.load(Ordering::Relaxed),
        };
        tracing::info!(
            connections = summary.connections,
            messages = summary.messages,
            frame_errors = summary.frame_errors,
            "MLLP listener stopped"
        );
        Ok(summary)
    }
}

struct Connection {
    processor: Arc<InboundProcessor>,
    counters: Arc<Counters>,
    max_frame_bytes: usize,
    idle_timeout: Option<Duration>,
    peer: SocketAddr,
}

enum Read {
    Frame(Option<std::io::Result<crate::transport::Frame>>),
    Idle,
}

impl Connection {
    async fn serve(self, stream: TcpStream, mut shutdown: watch::Receiver<bool>) {
        let mut framed = Framed::new(stream, MllpCodec::with_max_frame_bytes(self.max_frame_bytes));

        loop {
            let read = tokio::select! {
                _ = shutdown.changed() => break,
                read = self.next_frame(&mut framed) => read,
            };

            let ack = match read {
                Read::Idle => {
                    tracing::info!(peer = %self.peer, "Closing idle connection");
                    break;
                }
                Read::Frame(None) => break,
                Read::Frame(Some(Err(e))) => {
                    tracing::warn!(peer = %self.peer, error = %e, "Connection read failed");
                    break;
                }
                Read::Frame(Some(Ok(Err(frame_error)))) => {
                    self.counters.frame_errors.fetch_add(1, Ordering::Relaxed);
                    self.processor.frame_error_ack(&frame_error)
                }
                Read::Frame(Some(Ok(Ok(text)))) => {
                    self.counters.messages.fetch_add(1, Ordering::Relaxed);
                    self.processor.process(&text).await.ack
                }
            };

            if let Err(e) = framed.send(ack).await {
                tracing::warn!(peer = %self.peer, error = %e, "Failed to send acknowledgement");
                break;
            }
        }
        tracing::debug!(peer = %self.peer, "Connection closed");
    }

    async fn next_frame(&self, framed: &mut Framed<TcpStream, MllpCodec>) -> Read {
        match self.idle_timeout {
            Some(idle) => match tokio::time::timeout(idle, framed.next()).await {
                Ok(frame) => Read::Frame(frame),
                Err(_) => Read::Idle,
            },
            None => Read::Frame(framed.next().await),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::Store;
    use crate::adapters::memory::InMemoryStore;
    use crate::config::BridgeConfig;
    use crate::emission::EmissionRouter;
    use crate::transport::{encode_frame, AckReply};

    async fn start() -> (SocketAddr, watch::Sender<bool>, tokio::task::JoinHandle<Result<ServerSummary>>) {
        let store: Arc<dyn Store> = Arc::new(InMemoryStore::new());
        let mut config = BridgeConfig::default();
        config.listener.bind_address = "127.0.0.1".to_string();
        config.listener.port = 0;
        let router = Arc::new(EmissionRouter::builder(store.clone()).build().unwrap());
        let processor = Arc::new(InboundProcessor::new(&config, store, router));

        let server = MllpServer::bind(&config.listener, processor).await.unwrap();
        let addr = server.local_addr().unwrap();
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(server.run(rx));
        (addr, tx, handle)
    }

    const ADMIT: &str = "MSH|^~\\&|HIS|HOSP|BRIDGE|HOSP|20240101120000||ADT^A01^ADT_A01|MSG1|P|2.5\r\
EVN|A01|20240101120000\r\
PID|||12345^^^HOSP^PI||DOE^JOHN||19800101|M\r\
PV1||I|CARDIO^101^A||||||||||||||||V0001\r";

    #[tokio::test]
    async fn test_frames_are_answered_in_order() {
        let (addr, shutdown, handle) = start().await;
        let stream = TcpStream::connect(addr).await.unwrap();
        let mut framed = Framed::new(stream, MllpCodec::new());

        framed.send(ADMIT.to_string()).await.unwrap();
        framed
            .send(ADMIT.replace("|MSG1|", "|MSG2|").replace("V0001", "V0002"))
            .await
            .unwrap();

        let first = AckReply::parse(&framed.next().await.unwrap().unwrap().unwrap()).unwrap();
        let second = AckReply::parse(&framed.next().await.unwrap().unwrap().unwrap()).unwrap();
        assert_eq!(first.control_id, "MSG1");
        assert!(first.is_accepted());
        assert_eq!(second.control_id, "MSG2");

        drop(framed);
        shutdown.send(true).unwrap();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.connections, 1);
        assert_eq!(summary.messages, 2);
    }

    #[tokio::test]
    async fn test_malformed_frame_gets_ar_and_connection_survives() {
        let (addr, shutdown, handle) = start().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Frame cut short by the start of the next one
        let mut bytes = b"\x0bMSH|^~\\&|X".to_vec();
        bytes.extend(encode_frame(ADMIT).unwrap());
        tokio::io::AsyncWriteExt::write_all(&mut stream, &bytes).await.unwrap();

        let mut framed = Framed::new(stream, MllpCodec::new());
        let first = AckReply::parse(&framed.next().await.unwrap().unwrap().unwrap()).unwrap();
        assert_eq!(first.code, crate::transport::AckCode::AR);
        let second = AckReply::parse(&framed.next().await.unwrap().unwrap().unwrap()).unwrap();
        assert!(second.is_accepted());

        drop(framed);
        shutdown.send(true).unwrap();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary.frame_errors, 1);
    }

    #[tokio::test]
    async fn test_shutdown_stops_accepting() {
        let (_addr, shutdown, handle) = start().await;
        shutdown.send(true).unwrap();
        let summary = handle.await.unwrap().unwrap();
        assert_eq!(summary, ServerSummary::default());
    }
}
