//! Relay façade (§4.4): the bridge between engines and the relay transport.
//! Classifies inbound `(topic, hex_message)` pairs, correlates outbound
//! publishes to their response by JSON-RPC id — not merely by topic, which
//! was the source's correctness gap (§9) — and exposes the two streams
//! engines consume: reconnect signals and decoded inbound requests.

use {
    crate::{
        crypto::CryptoStore,
        rpc::{self, Payload, Request, Response},
        serializer::{self, SerializerError},
    },
    dashmap::DashMap,
    relay_client::{Client as TransportClient, ConnectionHandler, Error as TransportError, PublishedMessage},
    relay_rpc::domain::Topic,
    std::{sync::Arc, time::Duration},
    tokio::sync::{broadcast, oneshot},
};

#[derive(Debug, thiserror::Error)]
pub enum FacadeError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Serialize(#[from] SerializerError),

    #[error("correlation timed out")]
    Timeout,

    #[error("request cancelled before a response arrived")]
    Cancelled,

    #[error("peer returned an error: {0} ({1})")]
    Remote(i32, String),
}

/// A decoded inbound request, tagged with the topic it arrived on, handed
/// to the subscriber (§4.5) for engine dispatch.
#[derive(Debug, Clone)]
pub struct InboundRequest {
    pub topic: Topic,
    pub request: Request,
}

/// Default client-side correlation timeout (§5 "60 s recommended").
pub const DEFAULT_CORRELATION_TIMEOUT: Duration = Duration::from_secs(60);

struct PendingResponses {
    by_id: DashMap<i64, oneshot::Sender<Response>>,
}

impl PendingResponses {
    fn new() -> Self {
        Self {
            by_id: DashMap::new(),
        }
    }
}

/// Implements [`ConnectionHandler`] itself so reconnect/inbound plumbing
/// stays inside the façade rather than leaking transport types to engines
/// (§9 "flip to a message-passing model").
struct FacadeHandler {
    crypto: Arc<CryptoStore>,
    pending: Arc<PendingResponses>,
    inbound_tx: broadcast::Sender<InboundRequest>,
    connection_tx: broadcast::Sender<()>,
}

impl ConnectionHandler for FacadeHandler {
    fn connected(&mut self) {
        self.connection_tx.send(()).ok();
    }

    fn message_received(&mut self, message: PublishedMessage) {
        let topic = message.topic.clone();

        let value: serde_json::Value =
            match serializer::deserialize(&self.crypto, &topic, &message.message) {
                Ok(value) => value,
                Err(error) => {
                    tracing::debug!(%topic, %error, "dropping undecodable inbound message");
                    return;
                }
            };

        match Payload::from_json(&value) {
            Some(Payload::Request(request)) => {
                tracing::debug!(%topic, id = request.id, "inbound request");
                self.inbound_tx.send(InboundRequest { topic, request }).ok();
            }
            Some(Payload::Response(response)) => {
                if let Some((_, tx)) = self.pending.by_id.remove(&response.id()) {
                    tx.send(response).ok();
                } else {
                    tracing::debug!(%topic, id = response.id(), "response with no matching publish");
                }
            }
            None => {
                tracing::debug!(%topic, "dropping message that is neither request nor response");
            }
        }
    }

    fn inbound_error(&mut self, error: TransportError) {
        tracing::debug!(%error, "transport inbound error");
    }

    fn outbound_error(&mut self, error: TransportError) {
        tracing::debug!(%error, "transport outbound error");
    }
}

/// The relay façade proper: owns the transport client and the
/// request/response correlation table, and hands engines a typed,
/// topic-free-of-races publish API.
pub struct RelayFacade {
    transport: Arc<TransportClient>,
    crypto: Arc<CryptoStore>,
    pending: Arc<PendingResponses>,
    inbound_tx: broadcast::Sender<InboundRequest>,
    connection_tx: broadcast::Sender<()>,
    correlation_timeout: Duration,
    next_id: std::sync::atomic::AtomicI64,
}

impl RelayFacade {
    pub fn new(crypto: Arc<CryptoStore>, correlation_timeout: Duration) -> Self {
        let pending = Arc::new(PendingResponses::new());
        let (inbound_tx, _) = broadcast::channel(256);
        let (connection_tx, _) = broadcast::channel(16);

        let handler = FacadeHandler {
            crypto: crypto.clone(),
            pending: pending.clone(),
            inbound_tx: inbound_tx.clone(),
            connection_tx: connection_tx.clone(),
        };
        let transport = Arc::new(TransportClient::new(handler));

        Self {
            transport,
            crypto,
            pending,
            inbound_tx,
            connection_tx,
            correlation_timeout,
            next_id: std::sync::atomic::AtomicI64::new(1),
        }
    }

    pub fn transport(&self) -> Arc<TransportClient> {
        self.transport.clone()
    }

    pub fn crypto(&self) -> Arc<CryptoStore> {
        self.crypto.clone()
    }

    /// A fresh, monotonically increasing application-level JSON-RPC id.
    pub fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Stream of reconnect signals (§4.4 `transport_connection_events`),
    /// used by engines to restore subscriptions (§4.7 "Restore on
    /// reconnect").
    pub fn connection_events(&self) -> broadcast::Receiver<()> {
        self.connection_tx.subscribe()
    }

    /// Stream of decoded inbound requests, tagged with topic (§4.4
    /// `inbound_requests`), for the subscriber to dispatch.
    pub fn inbound_requests(&self) -> broadcast::Receiver<InboundRequest> {
        self.inbound_tx.subscribe()
    }

    /// Publishes `request` on `topic` and awaits the correlated response.
    /// Request id must already be set on `request`.
    ///
    /// Concurrent publishes on the same topic each get their own response:
    /// correlation is by `request.id`, not topic (§4.4, §9).
    pub async fn publish_request(
        &self,
        topic: &Topic,
        request: &Request,
        ttl: Duration,
    ) -> Result<Response, FacadeError> {
        let hex_message = serializer::serialize(&self.crypto, topic, request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.by_id.insert(request.id, tx);

        let publish_result = self.transport.publish(topic.clone(), hex_message, ttl).await;
        if let Err(err) = publish_result {
            self.pending.by_id.remove(&request.id);
            return Err(err.into());
        }

        match tokio::time::timeout(self.correlation_timeout, rx).await {
            Ok(Ok(response)) => match response {
                Response::Error { error, .. } => Err(FacadeError::Remote(error.code, error.message)),
                success @ Response::Success { .. } => Ok(success),
            },
            Ok(Err(_)) => Err(FacadeError::Cancelled),
            Err(_) => {
                self.pending.by_id.remove(&request.id);
                Err(FacadeError::Timeout)
            }
        }
    }

    /// Publishes a one-way notification (no response awaited), e.g.
    /// `session_delete`.
    pub async fn publish_notification(
        &self,
        topic: &Topic,
        request: &Request,
        ttl: Duration,
    ) -> Result<(), FacadeError> {
        let hex_message = serializer::serialize(&self.crypto, topic, request)?;
        self.transport.publish(topic.clone(), hex_message, ttl).await?;
        Ok(())
    }

    /// Responds to an inbound request correlated by `rpc::Response::id`.
    pub async fn respond(
        &self,
        topic: &Topic,
        response: &rpc::Response,
        ttl: Duration,
    ) -> Result<(), FacadeError> {
        let hex_message = serializer::serialize(&self.crypto, topic, response)?;
        self.transport.publish(topic.clone(), hex_message, ttl).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn next_id_is_monotonic() {
        let crypto = Arc::new(CryptoStore::new());
        let facade = RelayFacade::new(crypto, DEFAULT_CORRELATION_TIMEOUT);
        let a = facade.next_id();
        let b = facade.next_id();
        assert!(b > a);
    }
}
