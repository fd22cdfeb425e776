//! A single-connection JSON-RPC 2.0 client over WebSocket for the relay
//! (§4.3): publish/subscribe/unsubscribe with request/response correlation,
//! and inbound dispatch for `waku_subscription` pushes.

pub use {client::*, errors::*};
use {http::Request as HttpRequest, tokio_tungstenite::tungstenite::client::IntoClientRequest};

mod client;
mod errors;

/// Bearer API key used to authenticate the WebSocket upgrade (§6 "a single
/// API key, passed as an HTTP header"). Its `Debug` impl redacts the value so
/// it never ends up in logs incidentally.
#[derive(Clone)]
pub struct ApiKey(String);

impl ApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }
}

impl std::fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ApiKey(\"***\")")
    }
}

/// Relay connection options.
#[derive(Debug, Clone)]
pub struct ConnectionOptions {
    /// The relay websocket address, e.g. `wss://relay.example.org`.
    pub address: String,

    /// Authorization header value for the WebSocket upgrade.
    pub auth: ApiKey,

    /// Optional `Origin` header, subject to the relay's allow-list.
    pub origin: Option<String>,
}

impl ConnectionOptions {
    pub fn new(address: impl Into<String>, auth: ApiKey) -> Self {
        Self {
            address: address.into(),
            auth,
            origin: None,
        }
    }

    pub fn with_origin(mut self, origin: impl Into<Option<String>>) -> Self {
        self.origin = origin.into();
        self
    }

    pub(crate) fn into_request(self) -> Result<HttpRequest<()>, Error> {
        let Self {
            address,
            auth,
            origin,
        } = self;

        let mut request = address
            .into_client_request()
            .map_err(|_| RequestBuildError::InvalidAddress)?;

        let headers = request.headers_mut();

        let value = format!("Bearer {}", auth.0)
            .parse()
            .map_err(|_| RequestBuildError::Headers)?;
        headers.append("Authorization", value);

        if let Some(origin) = origin {
            let value = origin.parse().map_err(|_| RequestBuildError::Headers)?;
            headers.append("Origin", value);
        }

        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connection_request_carries_bearer_auth_and_origin() {
        let opts = ConnectionOptions::new("wss://relay.example.org", ApiKey::new("topsecret"))
            .with_origin(Some("https://dapp.example.org".to_owned()));

        let request = opts.into_request().unwrap();
        let headers = request.headers();
        assert_eq!(headers.get("Authorization").unwrap(), "Bearer topsecret");
        assert_eq!(
            headers.get("Origin").unwrap(),
            "https://dapp.example.org"
        );
    }

    #[test]
    fn api_key_debug_is_redacted() {
        let key = ApiKey::new("topsecret");
        assert_eq!(format!("{key:?}"), "ApiKey(\"***\")");
    }

    #[test]
    fn invalid_address_fails_request_build() {
        let opts = ConnectionOptions::new("not a url", ApiKey::new("key"));
        assert!(matches!(
            opts.into_request(),
            Err(Error::RequestBuilder(RequestBuildError::InvalidAddress))
        ));
    }
}
