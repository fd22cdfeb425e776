use {
    crate::Error,
    relay_rpc::{
        domain::MessageId,
        rpc::{ErrorData, RequestPayload},
    },
    tokio::sync::oneshot,
};

/// An inbound request from the relay (only `waku_subscription` pushes, in
/// this transport) awaiting a response.
#[derive(Debug)]
pub struct InboundRequest<T> {
    id: MessageId,
    data: T,
    tx: Option<oneshot::Sender<Result<serde_json::Value, ErrorData>>>,
}

impl<T> InboundRequest<T>
where
    T: RequestPayload,
{
    pub(super) fn new(
        id: MessageId,
        data: T,
        tx: oneshot::Sender<Result<serde_json::Value, ErrorData>>,
    ) -> Self {
        Self {
            id,
            data,
            tx: Some(tx),
        }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn data(&self) -> &T {
        &self.data
    }

    /// Responds to this request, consuming it.
    pub fn respond(mut self, result: Result<T::Response, T::Error>) -> Result<(), Error> {
        let tx = self.tx.take().ok_or(Error::ChannelClosed)?;
        let result = result
            .map_err(Into::into)
            .and_then(|data| serde_json::to_value(data).map_err(|_| ErrorData {
                code: -32603,
                message: "failed to serialize response".to_owned(),
                data: None,
            }));
        tx.send(result).map_err(|_| Error::ChannelClosed)
    }
}
