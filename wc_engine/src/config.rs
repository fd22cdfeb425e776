//! Client configuration (§5.3): relay address and credentials, the local
//! participant's metadata, and the knobs layered on top of the protocol
//! proper (response-correlation timeout).

use {
    crate::domain::AppMetadata,
    relay_client::ApiKey,
    std::time::Duration,
};

const DEFAULT_RELAY_ADDRESS: &str = "wss://relay.example.org";

/// Bearer credential for the relay connection. Wraps [`ApiKey`] only to give
/// the engine its own redacted `Debug` independent of the transport crate.
#[derive(Clone)]
pub struct SecretApiKey(String);

impl SecretApiKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub(crate) fn as_transport_key(&self) -> ApiKey {
        ApiKey::new(self.0.clone())
    }
}

impl std::fmt::Debug for SecretApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretApiKey(\"***\")")
    }
}

/// Configuration for a [`crate::Client`] (§5.3).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub relay_address: String,
    pub api_key: SecretApiKey,
    pub origin: Option<String>,
    pub metadata: AppMetadata,
    pub is_controller: bool,
    pub correlation_timeout: Duration,
}

impl ClientConfig {
    pub fn new(api_key: SecretApiKey, metadata: AppMetadata) -> Self {
        Self {
            relay_address: DEFAULT_RELAY_ADDRESS.to_owned(),
            api_key,
            origin: None,
            metadata,
            is_controller: false,
            correlation_timeout: crate::relay::DEFAULT_CORRELATION_TIMEOUT,
        }
    }

    pub fn with_relay_address(mut self, address: impl Into<String>) -> Self {
        self.relay_address = address.into();
        self
    }

    pub fn with_origin(mut self, origin: impl Into<String>) -> Self {
        self.origin = Some(origin.into());
        self
    }

    pub fn with_controller(mut self, is_controller: bool) -> Self {
        self.is_controller = is_controller;
        self
    }

    pub fn with_correlation_timeout(mut self, timeout: Duration) -> Self {
        self.correlation_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_point_at_the_example_relay() {
        let config = ClientConfig::new(SecretApiKey::new("key"), AppMetadata::default());
        assert_eq!(config.relay_address, DEFAULT_RELAY_ADDRESS);
        assert!(!config.is_controller);
    }

    #[test]
    fn debug_redacts_the_api_key() {
        let key = SecretApiKey::new("super-secret");
        assert_eq!(format!("{key:?}"), "SecretApiKey(\"***\")");
    }
}
