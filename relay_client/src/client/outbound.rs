use {
    crate::Error,
    pin_project::pin_project,
    relay_rpc::rpc::{Params, RequestPayload},
    std::{
        future::Future,
        marker::PhantomData,
        pin::Pin,
        task::{ready, Context, Poll},
    },
    tokio::sync::oneshot,
};

/// An outbound request, pending transmission on the websocket.
#[derive(Debug)]
pub struct OutboundRequest {
    pub(super) params: Params,
    pub(super) tx: oneshot::Sender<Result<serde_json::Value, Error>>,
}

impl OutboundRequest {
    pub(super) fn new(
        params: Params,
        tx: oneshot::Sender<Result<serde_json::Value, Error>>,
    ) -> Self {
        Self { params, tx }
    }

    pub(super) fn into_parts(
        self,
    ) -> (Params, oneshot::Sender<Result<serde_json::Value, Error>>) {
        (self.params, self.tx)
    }
}

/// Future that resolves with the typed RPC response for the request that
/// created it.
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project]
pub struct ResponseFuture<T> {
    #[pin]
    rx: oneshot::Receiver<Result<serde_json::Value, Error>>,
    _marker: PhantomData<T>,
}

impl<T> ResponseFuture<T> {
    pub(super) fn new(rx: oneshot::Receiver<Result<serde_json::Value, Error>>) -> Self {
        Self {
            rx,
            _marker: PhantomData,
        }
    }
}

impl<T> Future for ResponseFuture<T>
where
    T: RequestPayload,
{
    type Output = Result<T::Response, Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let result = ready!(this.rx.poll(cx)).map_err(|_| Error::ChannelClosed)?;

        Poll::Ready(match result {
            Ok(value) => serde_json::from_value(value).map_err(Error::Deserialization),
            Err(err) => Err(err),
        })
    }
}

/// Future that resolves with `Ok(())` once the server acknowledges the
/// request, discarding the (empty/boolean) response value.
#[must_use = "futures do nothing unless you `.await` or poll them"]
#[pin_project]
pub struct EmptyResponseFuture<T> {
    #[pin]
    rx: ResponseFuture<T>,
}

impl<T> EmptyResponseFuture<T> {
    pub(super) fn new(rx: ResponseFuture<T>) -> Self {
        Self { rx }
    }
}

impl<T> Future for EmptyResponseFuture<T>
where
    T: RequestPayload,
{
    type Output = Result<(), Error>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Poll::Ready(ready!(self.project().rx.poll(cx)).map(|_| ()))
    }
}

/// Creates an RPC request and its paired response future.
pub fn create_request<T>(data: T) -> (OutboundRequest, ResponseFuture<T>)
where
    T: RequestPayload,
{
    let (tx, rx) = oneshot::channel();
    (
        OutboundRequest::new(data.into_params(), tx),
        ResponseFuture::new(rx),
    )
}
