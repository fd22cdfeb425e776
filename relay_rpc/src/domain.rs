//! Wire-level identifiers shared between the transport and the protocol
//! engine: topics, JSON-RPC message ids, and relay-issued subscription ids.

use {
    rand::RngCore,
    serde_aux::prelude::deserialize_number_from_string,
    std::{str::FromStr, sync::Arc},
};

/// Byte length of a [`Topic`] once hex-decoded.
pub const TOPIC_LENGTH: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum DecodingError {
    #[error("invalid hex encoding")]
    Encoding,

    #[error("expected {expected} bytes, found {actual}")]
    Length { expected: usize, actual: usize },
}

new_type!(
    #[doc = "An opaque, 32-byte, hex-encoded relay subscription topic."]
    #[as_ref(forward)]
    #[from(forward)]
    Topic: Arc<str>
);

impl Topic {
    /// Generates a fresh random topic from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; TOPIC_LENGTH];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes).into())
    }

    /// Builds a topic from raw bytes (e.g. a settled topic = SHA-256 of the
    /// shared secret).
    pub fn from_bytes(bytes: &[u8; TOPIC_LENGTH]) -> Self {
        Self(hex::encode(bytes).into())
    }

    /// Validates that this topic is well-formed hex of the expected length.
    pub fn decode(&self) -> Result<[u8; TOPIC_LENGTH], DecodingError> {
        let bytes = hex::decode(self.0.as_ref()).map_err(|_| DecodingError::Encoding)?;
        bytes
            .as_slice()
            .try_into()
            .map_err(|_| DecodingError::Length {
                expected: TOPIC_LENGTH,
                actual: bytes.len(),
            })
    }
}

impl FromStr for Topic {
    type Err = DecodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let topic = Self(Arc::from(s));
        topic.decode()?;
        Ok(topic)
    }
}

new_type!(
    #[doc = "Relay-issued opaque subscription identifier."]
    #[as_ref(forward)]
    #[from(forward)]
    SubscriptionId: Arc<str>
);

new_type!(
    #[doc = "JSON-RPC request/response correlation id."]
    #[derive(Copy)]
    MessageId: #[serde(deserialize_with = "deserialize_number_from_string")] u64
);

impl MessageId {
    /// Generates ids from millisecond timestamps with a low-order counter,
    /// so a single process can produce many unique, roughly-ordered ids per
    /// second without any shared mutable state beyond the counter itself.
    pub fn generate(counter: u8) -> Self {
        let timestamp = chrono::Utc::now().timestamp_millis() as u64;
        Self(timestamp << 8 | counter as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn topic_round_trips_through_hex() {
        let topic = Topic::generate();
        assert_eq!(topic.decode().unwrap().len(), TOPIC_LENGTH);
    }

    #[test]
    fn topic_rejects_bad_hex() {
        let topic: Topic = Arc::<str>::from("not-hex").into();
        assert!(matches!(topic.decode(), Err(DecodingError::Encoding)));
    }

    #[test]
    fn topic_rejects_wrong_length() {
        let topic: Topic = Arc::<str>::from("aabb").into();
        assert!(matches!(
            topic.decode(),
            Err(DecodingError::Length { expected: 32, actual: 2 })
        ));
    }

    #[test]
    fn topic_from_bytes_matches_hex() {
        let bytes = [7u8; TOPIC_LENGTH];
        let topic = Topic::from_bytes(&bytes);
        assert_eq!(topic.as_ref(), hex::encode(bytes));
    }
}
