pub use tokio_tungstenite::tungstenite::protocol::CloseFrame;

pub type WsError = tokio_tungstenite::tungstenite::Error;

/// Wrapper around the websocket [`CloseFrame`] providing info about the
/// connection closing reason.
#[derive(Debug, Clone)]
pub struct CloseReason(pub Option<CloseFrame<'static>>);

impl std::fmt::Display for CloseReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Some(frame) => frame.fmt(f),
            None => f.write_str("<close frame unavailable>"),
        }
    }
}

/// Errors generated while building the WebSocket upgrade request from
/// [`ConnectionOptions`][crate::ConnectionOptions].
#[derive(Debug, thiserror::Error)]
pub enum RequestBuildError {
    #[error("invalid relay address")]
    InvalidAddress,

    #[error("failed to add request headers")]
    Headers,
}

/// Possible relay client errors.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to build connection request: {0}")]
    RequestBuilder(#[from] RequestBuildError),

    #[error("failed to connect: {0}")]
    ConnectionFailed(WsError),

    #[error("connection closed: {0}")]
    ConnectionClosed(CloseReason),

    #[error("failed to close connection: {0}")]
    ClosingFailed(WsError),

    #[error("not connected")]
    NotConnected,

    #[error("websocket error: {0}")]
    Socket(WsError),

    #[error("internal error: channel closed")]
    ChannelClosed,

    #[error("internal error: duplicate request id")]
    DuplicateRequestId,

    #[error("invalid response id")]
    InvalidResponseId,

    #[error("serialization failed: {0}")]
    Serialization(serde_json::Error),

    #[error("deserialization failed: {0}")]
    Deserialization(serde_json::Error),

    #[error("rpc error ({code}): {message}")]
    Rpc { code: i32, message: String },

    #[error("invalid request type")]
    InvalidRequestType,

    #[error("correlation timed out")]
    Timeout,
}

impl From<relay_rpc::rpc::ErrorData> for Error {
    fn from(value: relay_rpc::rpc::ErrorData) -> Self {
        Self::Rpc {
            code: value.code,
            message: value.message,
        }
    }
}
