use {
    self::connection::{connection_event_loop, ConnectionControl},
    crate::{ConnectionOptions, Error},
    relay_rpc::{
        domain::{SubscriptionId, Topic},
        rpc::{Publish, RequestPayload, Subscribe, Unsubscribe},
    },
    std::{sync::Arc, time::Duration},
    tokio::sync::{
        mpsc::{self, UnboundedSender},
        oneshot,
    },
};
pub use {inbound::*, outbound::*};

mod connection;
mod inbound;
mod outbound;
mod stream;

/// A message delivered by a `waku_subscription` push.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub topic: Topic,
    pub message: Arc<str>,
}

impl PublishedMessage {
    fn from_request(request: &InboundRequest<relay_rpc::rpc::Subscription>) -> Self {
        let data = &request.data().data;
        Self {
            topic: data.topic.clone(),
            message: data.message.clone(),
        }
    }
}

/// Handlers for the connection's lifecycle and inbound events (§4.3
/// "Connection lifecycle hooks").
pub trait ConnectionHandler: Send + 'static {
    /// Called when a connection to the relay is established (or
    /// re-established after a reconnect).
    fn connected(&mut self) {}

    /// Called when the relay connection is closed.
    fn disconnected(&mut self, _frame: Option<crate::CloseFrame<'static>>) {}

    /// Called when a message is pushed for a subscribed topic.
    fn message_received(&mut self, message: PublishedMessage);

    /// Called on an inbound decode/classification failure.
    fn inbound_error(&mut self, _error: Error) {}

    /// Called when writing to the websocket stream fails.
    fn outbound_error(&mut self, _error: Error) {}
}

/// The relay transport client (§4.3).
///
/// Owns a single websocket connection and multiplexes publish / subscribe /
/// unsubscribe requests over it, correlating responses by JSON-RPC id.
#[derive(Debug, Clone)]
pub struct Client {
    control_tx: UnboundedSender<ConnectionControl>,
}

impl Client {
    /// Creates a new [`Client`] bound to `handler`.
    pub fn new<T>(handler: T) -> Self
    where
        T: ConnectionHandler,
    {
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        tokio::spawn(connection_event_loop(control_rx, handler));
        Self { control_tx }
    }

    /// Publishes a message on `topic`. Not retried by the transport (§4.3).
    pub fn publish(
        &self,
        topic: Topic,
        message: impl Into<Arc<str>>,
        ttl: Duration,
    ) -> EmptyResponseFuture<Publish> {
        let (request, response) = create_request(Publish {
            topic,
            message: message.into(),
            ttl_secs: ttl.as_secs() as u32,
        });
        self.request(request);
        EmptyResponseFuture::new(response)
    }

    /// Subscribes to `topic`.
    pub fn subscribe(&self, topic: Topic) -> ResponseFuture<Subscribe> {
        let (request, response) = create_request(Subscribe { topic });
        self.request(request);
        response
    }

    /// Unsubscribes from `topic`.
    pub fn unsubscribe(
        &self,
        topic: Topic,
        subscription_id: SubscriptionId,
    ) -> EmptyResponseFuture<Unsubscribe> {
        let (request, response) = create_request(Unsubscribe {
            topic,
            subscription_id,
        });
        self.request(request);
        EmptyResponseFuture::new(response)
    }

    /// Opens the connection to the relay.
    pub async fn connect(&self, opts: ConnectionOptions) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        if self
            .control_tx
            .send(ConnectionControl::Connect {
                opts: Box::new(opts),
                tx,
            })
            .is_ok()
        {
            rx.await.map_err(|_| Error::ChannelClosed)?
        } else {
            Err(Error::ChannelClosed)
        }
    }

    /// Closes the connection to the relay.
    pub async fn disconnect(&self) -> Result<(), Error> {
        let (tx, rx) = oneshot::channel();
        if self
            .control_tx
            .send(ConnectionControl::Disconnect { tx })
            .is_ok()
        {
            rx.await.map_err(|_| Error::ChannelClosed)?
        } else {
            Err(Error::ChannelClosed)
        }
    }

    fn request(&self, request: OutboundRequest) {
        if let Err(err) = self
            .control_tx
            .send(ConnectionControl::OutboundRequest(request))
        {
            let ConnectionControl::OutboundRequest(request) = err.0 else {
                unreachable!();
            };
            request.tx.send(Err(Error::ChannelClosed)).ok();
        }
    }
}
