//! Delivery transports
//!
//! A [`Deliverer`] sends one payload to one endpoint and reports the peer's
//! answer. Failures are returned as [`DeliveryError`] and never retried here;
//! the router records them on the emission record.

use crate::domain::endpoint::{Endpoint, EndpointTransport};
use crate::domain::errors::DeliveryError;
use crate::emission::payload::OutboundPayload;
use crate::transport::{AckReply, MllpCodec};
use async_trait::async_trait;
use futures::{FutureExt, SinkExt, StreamExt};
use reqwest::{Client, ClientBuilder};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::codec::Framed;

/// What the peer answered
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryResponse {
    /// Raw acknowledgement or response body
    pub body: String,
    pub accepted: bool,
    /// Why the peer refused the payload
    pub reason: Option<String>,
}

/// Sends payloads to one endpoint
#[async_trait]
pub trait Deliverer: Send + Sync {
    async fn deliver(&self, payload: &OutboundPayload) -> Result<DeliveryResponse, DeliveryError>;
}

/// Deliverer matching the endpoint's transport
pub fn deliverer_for(
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<Arc<dyn Deliverer>, DeliveryError> {
    match &endpoint.transport {
        EndpointTransport::Mllp { host, port } => Ok(Arc::new(MllpDeliverer::new(host, *port))),
        EndpointTransport::FhirHttp { base_url } => {
            Ok(Arc::new(FhirHttpDeliverer::new(base_url, timeout)?))
        }
    }
}

type Connection = Framed<TcpStream, MllpCodec>;

/// HL7 v2 over MLLP on one persistent connection
///
/// Deliveries take turns on the connection, matching the router's single
/// worker per endpoint. The connection is kept after an accepted or refused
/// acknowledgement and dropped on any error.
pub struct MllpDeliverer {
    peer: String,
    conn: Mutex<Option<Connection>>,
}

impl MllpDeliverer {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            peer: format!("{host}:{port}"),
            conn: Mutex::new(None),
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// True while a connection is kept open for the next delivery
    pub async fn is_connected(&self) -> bool {
        self.conn.lock().await.is_some()
    }

    async fn connect(&self) -> Result<Connection, DeliveryError> {
        let stream = TcpStream::connect(&self.peer)
            .await
            .map_err(|e| DeliveryError::ConnectionFailed {
                peer: self.peer.clone(),
                reason: e.to_string(),
            })?;
        stream.set_nodelay(true).map_err(|e| self.io(e))?;
        tracing::debug!(peer = %self.peer, "Opened MLLP connection");
        Ok(Framed::new(stream, MllpCodec::new()))
    }

    fn io(&self, err: std::io::Error) -> DeliveryError {
        DeliveryError::Io {
            peer: self.peer.clone(),
            reason: err.to_string(),
        }
    }

    /// Writes one complete frame. A peer never processes a frame whose write
    /// failed, since it lacks its end block.
    async fn write(&self, conn: &mut Connection, payload: &OutboundPayload) -> Result<(), DeliveryError> {
        conn.send(payload.body.clone()).await.map_err(|e| self.io(e))
    }

    /// Reads the acknowledgement of the frame just written
    async fn read_ack(
        &self,
        conn: &mut Connection,
        payload: &OutboundPayload,
    ) -> Result<(AckReply, String), DeliveryError> {
        let text = match conn.next().await {
            None => return Err(DeliveryError::NoAcknowledgement(self.peer.clone())),
            Some(Err(e)) => return Err(self.io(e)),
            Some(Ok(Err(frame))) => {
                return Err(DeliveryError::MalformedResponse(frame.to_string()))
            }
            Some(Ok(Ok(text))) => text,
        };

        let reply = AckReply::parse(&text)?;
        if reply.control_id != payload.control_id {
            return Err(DeliveryError::MalformedResponse(format!(
                "acknowledgement references {}, expected {}",
                reply.control_id, payload.control_id
            )));
        }
        Ok((reply, text))
    }

    /// The kept connection if it is still usable, else a new one. The flag
    /// tells whether the connection was kept from an earlier delivery.
    async fn checkout(&self, kept: Option<Connection>) -> Result<(Connection, bool), DeliveryError> {
        if let Some(mut conn) = kept {
            if is_reusable(&mut conn) {
                return Ok((conn, true));
            }
            tracing::debug!(peer = %self.peer, "Kept connection was closed by the peer, reconnecting");
        }
        Ok((self.connect().await?, false))
    }
}

/// A kept connection must have nothing to read: a peer that closed it reads
/// as end of stream, and unsolicited bytes would be taken for the next
/// acknowledgement.
fn is_reusable(conn: &mut Connection) -> bool {
    conn.next().now_or_never().is_none()
}

#[async_trait]
impl Deliverer for MllpDeliverer {
    /// Reconnects at most once, and only when writing on a kept connection
    /// fails. Once a frame is written it is never sent again: a missing or
    /// unreadable acknowledgement is returned as the delivery's failure.
    async fn deliver(&self, payload: &OutboundPayload) -> Result<DeliveryResponse, DeliveryError> {
        let mut slot = self.conn.lock().await;

        let (mut conn, kept) = self.checkout(slot.take()).await?;
        if let Err(err) = self.write(&mut conn, payload).await {
            if !kept {
                return Err(err);
            }
            tracing::debug!(peer = %self.peer, error = %err, "Write on kept connection failed, reconnecting");
            conn = self.connect().await?;
            self.write(&mut conn, payload).await?;
        }

        let (reply, text) = self.read_ack(&mut conn, payload).await?;
        *slot = Some(conn);

        let accepted = reply.is_accepted();
        Ok(DeliveryResponse {
            body: text,
            accepted,
            reason: (!accepted).then(|| reply.reason()),
        })
    }
}

/// FHIR messages over HTTP (`POST <base>/$process-message`)
pub struct FhirHttpDeliverer {
    client: Client,
    url: String,
}

impl FhirHttpDeliverer {
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, DeliveryError> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            .build()
            .map_err(|e| DeliveryError::Misconfigured(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            url: format!("{}/$process-message", base_url.trim_end_matches('/')),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl Deliverer for FhirHttpDeliverer {
    async fn deliver(&self, payload: &OutboundPayload) -> Result<DeliveryResponse, DeliveryError> {
        let resp = self
            .client
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "application/fhir+json")
            .header(reqwest::header::ACCEPT, "application/fhir+json")
            .body(payload.body.clone())
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    DeliveryError::ConnectionFailed {
                        peer: self.url.clone(),
                        reason: e.to_string(),
                    }
                } else {
                    DeliveryError::Io {
                        peer: self.url.clone(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| DeliveryError::Io {
            peer: self.url.clone(),
            reason: e.to_string(),
        })?;

        if status.is_success() {
            Ok(DeliveryResponse {
                body,
                accepted: true,
                reason: None,
            })
        } else {
            Ok(DeliveryResponse {
                reason: Some(format!("HTTP {}", status.as_u16())),
                body,
                accepted: false,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::message::MessageKind;
    use crate::hl7::{Message, TriggerEvent};
    use crate::transport::AckBuilder;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::net::TcpListener;

    fn payload(control_id: &str) -> OutboundPayload {
        OutboundPayload {
            kind: MessageKind::Hl7v2,
            body: format!(
                "MSH|^~\\&|MEDBRIDGE|HOSP|RIS||20240101120000||ADT^A28^ADT_A01|{control_id}|P|2.5\r"
            ),
            control_id: control_id.to_string(),
            trigger: TriggerEvent::A28,
        }
    }

    /// Acknowledges every frame with `code`; closes each connection after
    /// `per_connection` frames. Returns the port and an accept counter.
    async fn ack_server(code: &'static str, per_connection: usize) -> (u16, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let accepted = Arc::new(AtomicUsize::new(0));
        let counter = accepted.clone();
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                counter.fetch_add(1, Ordering::SeqCst);
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, MllpCodec::new());
                    for _ in 0..per_connection {
                        let Some(Ok(Ok(text))) = framed.next().await else { break };
                        let header = Message::parse(&text).unwrap().header();
                        let builder = AckBuilder::new("RIS", "HOSP");
                        let ack = match code {
                            "AA" => builder.accept(&header),
                            _ => builder.reject(&header, "PID3_EMPTY", "no identifier"),
                        };
                        framed.send(ack).await.unwrap();
                    }
                });
            }
        });
        (port, accepted)
    }

    #[tokio::test]
    async fn test_mllp_delivery_reuses_connection() {
        let (port, connections) = ack_server("AA", usize::MAX).await;
        let deliverer = MllpDeliverer::new("127.0.0.1", port);

        for id in ["C1", "C2"] {
            let response = deliverer.deliver(&payload(id)).await.unwrap();
            assert!(response.accepted);
            assert!(response.body.contains(&format!("MSA|AA|{id}")));
        }
        assert_eq!(connections.load(Ordering::SeqCst), 1);
        assert!(deliverer.is_connected().await);
    }

    #[tokio::test]
    async fn test_mllp_negative_ack_is_not_accepted() {
        let (port, _) = ack_server("AE", usize::MAX).await;
        let deliverer = MllpDeliverer::new("127.0.0.1", port);
        let response = deliverer.deliver(&payload("C1")).await.unwrap();
        assert!(!response.accepted);
        assert!(response.reason.unwrap().starts_with("AE PID3_EMPTY"));
    }

    #[tokio::test]
    async fn test_mllp_closed_kept_connection_is_replaced() {
        let (port, connections) = ack_server("AA", 1).await;
        let deliverer = MllpDeliverer::new("127.0.0.1", port);

        deliverer.deliver(&payload("C1")).await.unwrap();
        // Give the server task time to drop its side
        tokio::time::sleep(Duration::from_millis(50)).await;
        let response = deliverer.deliver(&payload("C2")).await.unwrap();
        assert!(response.accepted);
        assert!(response.body.contains("MSA|AA|C2"));
        assert_eq!(connections.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_mllp_unacknowledged_frame_is_not_resent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let frames = Arc::new(AtomicUsize::new(0));
        let connections = Arc::new(AtomicUsize::new(0));
        let (frames_seen, accepted) = (frames.clone(), connections.clone());
        // Acknowledges the first frame of a connection, then reads the second
        // and closes without answering
        tokio::spawn(async move {
            loop {
                let Ok((stream, _)) = listener.accept().await else { break };
                accepted.fetch_add(1, Ordering::SeqCst);
                let frames_seen = frames_seen.clone();
                tokio::spawn(async move {
                    let mut framed = Framed::new(stream, MllpCodec::new());
                    let Some(Ok(Ok(text))) = framed.next().await else { return };
                    frames_seen.fetch_add(1, Ordering::SeqCst);
                    let header = Message::parse(&text).unwrap().header();
                    framed
                        .send(AckBuilder::new("RIS", "HOSP").accept(&header))
                        .await
                        .unwrap();
                    if let Some(Ok(Ok(_))) = framed.next().await {
                        frames_seen.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        let deliverer = MllpDeliverer::new("127.0.0.1", port);
        assert!(deliverer.deliver(&payload("C1")).await.unwrap().accepted);

        let err = deliverer.deliver(&payload("C2")).await.unwrap_err();
        assert!(matches!(
            err,
            DeliveryError::NoAcknowledgement(_) | DeliveryError::Io { .. }
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(frames.load(Ordering::SeqCst), 2);
        assert_eq!(connections.load(Ordering::SeqCst), 1);
        assert!(!deliverer.is_connected().await);
    }

    #[tokio::test]
    async fn test_mllp_connection_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let deliverer = MllpDeliverer::new("127.0.0.1", port);
        let err = deliverer.deliver(&payload("C1")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::ConnectionFailed { .. }));
        assert!(!deliverer.is_connected().await);
    }

    #[tokio::test]
    async fn test_fhir_delivery_posts_bundle() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/fhir/$process-message")
            .match_header("content-type", "application/fhir+json")
            .with_status(200)
            .with_body(r#"{"resourceType":"Bundle"}"#)
            .create_async()
            .await;

        let deliverer =
            FhirHttpDeliverer::new(&format!("{}/fhir/", server.url()), Duration::from_secs(5))
                .unwrap();
        let response = deliverer.deliver(&payload("F1")).await.unwrap();
        assert!(response.accepted);
        assert!(response.body.contains("Bundle"));
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_fhir_non_success_status_is_refusal() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/$process-message")
            .with_status(422)
            .with_body("unprocessable")
            .create_async()
            .await;

        let deliverer = FhirHttpDeliverer::new(&server.url(), Duration::from_secs(5)).unwrap();
        let response = deliverer.deliver(&payload("F1")).await.unwrap();
        assert!(!response.accepted);
        assert_eq!(response.reason.as_deref(), Some("HTTP 422"));
        assert_eq!(response.body, "unprocessable");
    }
}
