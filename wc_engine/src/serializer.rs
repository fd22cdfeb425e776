//! Serializer (§4.2): pure(ish) functions over `(topic, payload)` that
//! encrypt/hex-frame outbound messages and reverse the process inbound. The
//! pairing's bootstrap `pairing_approve` is the one message sent on a topic
//! with no agreement key yet, so encryption is conditional on one being
//! present.

use {
    crate::crypto::{CryptoError, CryptoStore},
    relay_rpc::domain::Topic,
    serde::{de::DeserializeOwned, Serialize},
};

#[derive(Debug, thiserror::Error)]
pub enum SerializerError {
    #[error("payload is not valid hex")]
    Hex(#[from] hex::FromHexError),

    #[error("payload is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("decrypted payload is not valid UTF-8")]
    Utf8,
}

/// Encodes `payload` as JSON, encrypts it under `topic`'s agreement key if
/// one is present, and hex-frames the result for JSON-RPC transport.
pub fn serialize<T>(crypto: &CryptoStore, topic: &Topic, payload: &T) -> Result<String, SerializerError>
where
    T: Serialize,
{
    let json = serde_json::to_vec(payload)?;

    let framed = match crypto.get_agreement(topic) {
        Some(_) => crypto.encrypt(topic, &json)?,
        None => json,
    };

    Ok(hex::encode(framed))
}

/// Reverses [`serialize`]: hex-decodes, decrypts under `topic`'s agreement
/// key if one is present, and parses the resulting JSON.
pub fn deserialize<T>(crypto: &CryptoStore, topic: &Topic, hex_string: &str) -> Result<T, SerializerError>
where
    T: DeserializeOwned,
{
    let framed = hex::decode(hex_string)?;

    let json = match crypto.get_agreement(topic) {
        Some(_) => crypto.decrypt(topic, &framed)?,
        None => framed,
    };

    Ok(serde_json::from_slice(&json)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Serialize, serde::Deserialize, PartialEq, Eq)]
    struct Example {
        a: u32,
        b: String,
    }

    #[test]
    fn round_trips_without_agreement() {
        let crypto = CryptoStore::new();
        let topic = Topic::generate();
        let value = Example {
            a: 7,
            b: "hi".to_owned(),
        };

        let hex_string = serialize(&crypto, &topic, &value).unwrap();
        let round_tripped: Example = deserialize(&crypto, &topic, &hex_string).unwrap();
        assert_eq!(value, round_tripped);
    }

    #[test]
    fn round_trips_with_agreement() {
        let crypto = CryptoStore::new();

        let a_sk = crypto.generate_private_key();
        let a_pub = a_sk.public_hex();
        let b_sk = crypto.generate_private_key();
        let b_pub = b_sk.public_hex();

        let a_keys = CryptoStore::derive_agreement(a_sk, &b_pub).unwrap();
        let b_keys = CryptoStore::derive_agreement(b_sk, &a_pub).unwrap();
        let topic = a_keys.settled_topic();

        crypto.put_agreement(topic.clone(), a_keys);

        let value = Example {
            a: 42,
            b: "settled".to_owned(),
        };
        let hex_string = serialize(&crypto, &topic, &value).unwrap();

        crypto.put_agreement(topic.clone(), b_keys);
        let round_tripped: Example = deserialize(&crypto, &topic, &hex_string).unwrap();
        assert_eq!(value, round_tripped);
    }

    #[test]
    fn rejects_non_hex_input() {
        let crypto = CryptoStore::new();
        let topic = Topic::generate();
        assert!(matches!(
            deserialize::<Example>(&crypto, &topic, "not hex"),
            Err(SerializerError::Hex(_))
        ));
    }
}
