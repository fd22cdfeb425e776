use {
    super::{
        inbound::InboundRequest,
        outbound::{create_request, OutboundRequest, ResponseFuture},
    },
    crate::{CloseFrame, Error},
    futures_util::{stream::FusedStream, SinkExt, Stream, StreamExt},
    relay_rpc::{
        domain::MessageId,
        rpc::{self, ErrorData, Params, Payload, RequestPayload, Response, SuccessfulResponse, Subscription},
    },
    std::{
        collections::{hash_map::Entry, HashMap},
        pin::Pin,
        sync::atomic::{AtomicU8, Ordering},
        task::{Context, Poll},
    },
    tokio::{
        net::TcpStream,
        sync::{
            mpsc,
            mpsc::{UnboundedReceiver, UnboundedSender},
            oneshot,
        },
    },
    tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream},
};

pub type SocketStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a connection to the relay and wraps it in a [`ClientStream`].
pub async fn create_stream(request: http::Request<()>) -> Result<ClientStream, Error> {
    let (socket, _) = connect_async(request)
        .await
        .map_err(Error::ConnectionFailed)?;
    Ok(ClientStream::new(socket))
}

/// Events produced by polling [`ClientStream`].
#[derive(Debug)]
pub enum StreamEvent {
    /// Inbound `waku_subscription` push awaiting a response.
    InboundSubscriptionRequest(InboundRequest<Subscription>),

    /// Failed to parse an inbound message, or it used an unsupported method
    /// or an id with no matching outstanding request.
    InboundError(Error),

    /// Failed to write a queued request to the socket.
    OutboundError(Error),

    /// The connection closed. The last event the stream produces.
    ConnectionClosed(Option<CloseFrame<'static>>),
}

/// Multiplexes outbound RPC requests and inbound pushes/responses over a
/// single websocket, correlating responses to requests by JSON-RPC id
/// (§4.4, resolving the single-outstanding-request-per-topic gap the source
/// relay had).
pub struct ClientStream {
    socket: SocketStream,
    outbound_tx: UnboundedSender<Message>,
    outbound_rx: UnboundedReceiver<Message>,
    requests: HashMap<MessageId, oneshot::Sender<Result<serde_json::Value, Error>>>,
    id_counter: AtomicU8,
    close_frame: Option<CloseFrame<'static>>,
}

impl ClientStream {
    pub fn new(socket: SocketStream) -> Self {
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Self {
            socket,
            outbound_tx,
            outbound_rx,
            requests: HashMap::new(),
            id_counter: AtomicU8::new(0),
            close_frame: None,
        }
    }

    fn next_id(&self) -> MessageId {
        let counter = self.id_counter.fetch_add(1, Ordering::Relaxed);
        MessageId::generate(counter)
    }

    /// Sends an already-built [`OutboundRequest`].
    pub fn send_raw(&mut self, request: OutboundRequest) {
        let (params, tx) = request.into_parts();
        let id = self.next_id();
        let request = Payload::Request(rpc::Request::new(id, params));
        match serde_json::to_string(&request) {
            Ok(data) => match self.requests.entry(id) {
                Entry::Occupied(_) => {
                    tx.send(Err(Error::DuplicateRequestId)).ok();
                }
                Entry::Vacant(entry) => {
                    entry.insert(tx);
                    self.outbound_tx.send(Message::Text(data)).ok();
                }
            },
            Err(err) => {
                tx.send(Err(Error::Serialization(err))).ok();
            }
        }
    }

    /// Builds an RPC request from typed params and sends it, returning a
    /// future that resolves with the response.
    pub fn send<T>(&mut self, request: T) -> ResponseFuture<T>
    where
        T: RequestPayload,
    {
        let (request, response) = create_request(request);
        self.send_raw(request);
        response
    }

    pub async fn close(&mut self, frame: Option<CloseFrame<'static>>) -> Result<(), Error> {
        self.close_frame = frame.clone();
        self.socket.close(frame).await.map_err(Error::ClosingFailed)
    }

    /// Parses an inbound `waku_subscription` push, wiring its response
    /// channel to serialize straight back out over `outbound_tx`.
    fn handle_payload(&mut self, message: Message) -> Option<StreamEvent> {
        let payload: Payload = match serde_json::from_slice(&message.into_data()) {
            Ok(payload) => payload,
            Err(err) => return Some(StreamEvent::InboundError(Error::Deserialization(err))),
        };

        match payload {
            Payload::Request(request) => {
                let id = request.id;
                match request.params {
                    Params::Subscription(data) => {
                        let (tx, rx) = oneshot::channel::<Result<serde_json::Value, ErrorData>>();
                        let outbound_tx = self.outbound_tx.clone();
                        tokio::spawn(async move {
                            let Ok(result) = rx.await else {
                                return;
                            };
                            let payload = match result {
                                Ok(result) => Payload::Response(Response::Success(
                                    SuccessfulResponse::new(id, result),
                                )),
                                Err(error) => Payload::Response(Response::Error(
                                    rpc::ErrorResponse::new(id, error),
                                )),
                            };
                            if let Ok(data) = serde_json::to_string(&payload) {
                                outbound_tx.send(Message::Text(data)).ok();
                            }
                        });

                        Some(StreamEvent::InboundSubscriptionRequest(InboundRequest::new(
                            id, data, tx,
                        )))
                    }
                    _ => Some(StreamEvent::InboundError(Error::InvalidRequestType)),
                }
            }

            Payload::Response(response) => {
                let id = response.id();
                if let Some(tx) = self.requests.remove(&id) {
                    let result = match response {
                        Response::Error(response) => Err(Error::from(response.error)),
                        Response::Success(response) => Ok(response.result),
                    };
                    tx.send(result).ok();

                    if self.requests.len().saturating_mul(3) < self.requests.capacity() {
                        self.requests.shrink_to_fit();
                    }
                    None
                } else {
                    Some(StreamEvent::InboundError(Error::InvalidResponseId))
                }
            }
        }
    }

    fn poll_write(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Error>> {
        let mut should_flush = false;

        loop {
            match self.socket.poll_ready_unpin(cx) {
                Poll::Ready(Ok(())) => {
                    if let Poll::Ready(Some(next_message)) = self.outbound_rx.poll_recv(cx) {
                        if let Err(err) = self.socket.start_send_unpin(next_message) {
                            return Poll::Ready(Err(Error::Socket(err)));
                        }
                        should_flush = true;
                    } else if should_flush {
                        return self.socket.poll_flush_unpin(cx).map_err(Error::Socket);
                    } else {
                        return Poll::Pending;
                    }
                }
                Poll::Ready(Err(err)) => return Poll::Ready(Err(Error::Socket(err))),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

impl Stream for ClientStream {
    type Item = StreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.socket.is_terminated() {
            return Poll::Ready(None);
        }

        while let Poll::Ready(data) = self.socket.poll_next_unpin(cx) {
            match data {
                Some(Ok(message @ (Message::Binary(_) | Message::Text(_)))) => {
                    if let Some(event) = self.handle_payload(message) {
                        return Poll::Ready(Some(event));
                    }
                }
                Some(Ok(Message::Close(frame))) => {
                    self.close_frame = frame.clone();
                    return Poll::Ready(Some(StreamEvent::ConnectionClosed(frame)));
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    return Poll::Ready(Some(StreamEvent::InboundError(Error::Socket(err))))
                }
                None => {
                    return Poll::Ready(Some(StreamEvent::ConnectionClosed(
                        self.close_frame.clone(),
                    )))
                }
            }
        }

        match self.poll_write(cx) {
            Poll::Ready(Err(error)) => Poll::Ready(Some(StreamEvent::OutboundError(error))),
            _ => Poll::Pending,
        }
    }
}

impl FusedStream for ClientStream {
    fn is_terminated(&self) -> bool {
        self.socket.is_terminated()
    }
}

impl Drop for ClientStream {
    fn drop(&mut self) {
        let reason = crate::CloseReason(self.close_frame.take());
        for (_, tx) in self.requests.drain() {
            tx.send(Err(Error::ConnectionClosed(reason.clone()))).ok();
        }
    }
}
