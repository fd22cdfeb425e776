//! Crypto store (§4.1): X25519 key agreement and the per-topic AEAD used to
//! encrypt every payload. Keys never leave this module except as a signed or
//! hex-encoded public key.

use {
    chacha20poly1305::{
        aead::{Aead, KeyInit},
        AeadCore, ChaCha20Poly1305, Nonce,
    },
    dashmap::DashMap,
    rand::rngs::OsRng,
    relay_rpc::domain::{Topic, TOPIC_LENGTH},
    sha2::{Digest, Sha256},
    std::fmt::{self, Debug, Formatter},
    x25519_dalek::{EphemeralSecret, PublicKey},
};

#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("no private key for public key {0}")]
    PrivateKeyNotFound(String),

    #[error("no agreement key for topic {0}")]
    KeyNotFound(Topic),

    #[error("invalid public key")]
    InvalidPublicKey,

    #[error("encryption failed")]
    Encryption,

    #[error("decryption failed")]
    Decryption,
}

/// An ephemeral X25519 secret, held only long enough to derive an agreement.
pub struct PrivateKey(EphemeralSecret);

impl Debug for PrivateKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str("PrivateKey(\"***\")")
    }
}

impl PrivateKey {
    pub fn public(&self) -> [u8; 32] {
        *PublicKey::from(&self.0).as_bytes()
    }

    pub fn public_hex(&self) -> String {
        hex::encode(self.public())
    }
}

/// The result of an X25519 Diffie-Hellman agreement: the raw shared secret
/// and both participants' public keys, used as-is for AEAD (§4.1).
#[derive(Clone)]
pub struct AgreementKeys {
    shared_secret: [u8; 32],
    pub self_public: [u8; 32],
    pub peer_public: [u8; 32],
}

impl Debug for AgreementKeys {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgreementKeys")
            .field("shared_secret", &"***")
            .field("self_public", &hex::encode(self.self_public))
            .field("peer_public", &hex::encode(self.peer_public))
            .finish()
    }
}

impl AgreementKeys {
    /// The settled topic for this agreement: SHA-256 of the shared secret.
    pub fn settled_topic(&self) -> Topic {
        let digest: [u8; TOPIC_LENGTH] = Sha256::digest(self.shared_secret).into();
        Topic::from_bytes(&digest)
    }

    fn cipher(&self) -> ChaCha20Poly1305 {
        ChaCha20Poly1305::new((&self.shared_secret).into())
    }
}

/// Holds private keys (by their own public key) and per-topic agreement
/// keys. The only component that ever touches raw key material.
#[derive(Default)]
pub struct CryptoStore {
    private_keys: DashMap<String, PrivateKey>,
    agreements: DashMap<Topic, AgreementKeys>,
}

impl Debug for CryptoStore {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_struct("CryptoStore")
            .field("private_keys", &self.private_keys.len())
            .field("agreements", &self.agreements.len())
            .finish()
    }
}

impl CryptoStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Generates a fresh ephemeral X25519 secret and stores it, keyed by its
    /// own public key.
    pub fn generate_private_key(&self) -> PrivateKey {
        let sk = PrivateKey(EphemeralSecret::random_from_rng(OsRng));
        sk
    }

    pub fn put_private_key(&self, sk: PrivateKey) -> String {
        let public_hex = sk.public_hex();
        self.private_keys.insert(public_hex.clone(), sk);
        public_hex
    }

    pub fn take_private_key(&self, self_public_hex: &str) -> Result<PrivateKey, CryptoError> {
        self.private_keys
            .remove(self_public_hex)
            .map(|(_, sk)| sk)
            .ok_or_else(|| CryptoError::PrivateKeyNotFound(self_public_hex.to_owned()))
    }

    /// Performs the X25519 agreement, consuming `self_priv` (ephemeral
    /// secrets are single-use by construction).
    pub fn derive_agreement(
        self_priv: PrivateKey,
        peer_public_hex: &str,
    ) -> Result<AgreementKeys, CryptoError> {
        let peer_bytes: [u8; 32] = hex::decode(peer_public_hex)
            .map_err(|_| CryptoError::InvalidPublicKey)?
            .try_into()
            .map_err(|_| CryptoError::InvalidPublicKey)?;
        let self_public = self_priv.public();
        let shared_secret = *self_priv.0.diffie_hellman(&PublicKey::from(peer_bytes)).as_bytes();

        Ok(AgreementKeys {
            shared_secret,
            self_public,
            peer_public: peer_bytes,
        })
    }

    pub fn put_agreement(&self, topic: Topic, keys: AgreementKeys) {
        self.agreements.insert(topic, keys);
    }

    pub fn get_agreement(&self, topic: &Topic) -> Option<AgreementKeys> {
        self.agreements.get(topic).map(|entry| entry.clone())
    }

    /// Drops the agreement key for `topic`. Called when a sequence is
    /// deleted or migrates off the topic.
    pub fn drop_agreement(&self, topic: &Topic) {
        self.agreements.remove(topic);
    }

    /// Copies the agreement installed under `from` onto `to`, used to open
    /// the session engine's "pre-settlement" channel: the session proposal
    /// topic temporarily reuses the pairing's key before its own agreement
    /// is derived.
    pub fn copy_agreement(&self, from: &Topic, to: Topic) -> Result<(), CryptoError> {
        let keys = self
            .get_agreement(from)
            .ok_or_else(|| CryptoError::KeyNotFound(from.clone()))?;
        self.agreements.insert(to, keys);
        Ok(())
    }

    /// Encrypts `plaintext` under `topic`'s agreement key.
    ///
    /// Wire format: `nonce (12 bytes) || ciphertext || tag`, hex-encoded by
    /// the caller (the serializer, §4.2).
    pub fn encrypt(&self, topic: &Topic, plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let keys = self
            .get_agreement(topic)
            .ok_or_else(|| CryptoError::KeyNotFound(topic.clone()))?;
        let cipher = keys.cipher();
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CryptoError::Encryption)?;

        let mut out = Vec::with_capacity(nonce.len() + ciphertext.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    /// Decrypts a `nonce || ciphertext || tag` blob under `topic`'s
    /// agreement key.
    pub fn decrypt(&self, topic: &Topic, blob: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let keys = self
            .get_agreement(topic)
            .ok_or_else(|| CryptoError::KeyNotFound(topic.clone()))?;
        let cipher = keys.cipher();

        if blob.len() < 12 {
            return Err(CryptoError::Decryption);
        }
        let (nonce_bytes, ciphertext) = blob.split_at(12);
        let nonce = Nonce::from_slice(nonce_bytes);
        cipher
            .decrypt(nonce, ciphertext)
            .map_err(|_| CryptoError::Decryption)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn agreement_settled_topic_matches_shared_secret_hash() {
        let store = CryptoStore::new();

        let proposer_sk = store.generate_private_key();
        let proposer_pub = proposer_sk.public_hex();

        let responder_sk = store.generate_private_key();
        let responder_pub = responder_sk.public_hex();

        let responder_keys = CryptoStore::derive_agreement(responder_sk, &proposer_pub).unwrap();
        let proposer_keys = CryptoStore::derive_agreement(proposer_sk, &responder_pub).unwrap();

        assert_eq!(
            responder_keys.settled_topic(),
            proposer_keys.settled_topic()
        );
        assert_eq!(responder_keys.shared_secret, proposer_keys.shared_secret);
    }

    #[test]
    fn encrypt_decrypt_round_trips() {
        let store = CryptoStore::new();
        let a_sk = store.generate_private_key();
        let a_pub = a_sk.public_hex();
        let b_sk = store.generate_private_key();
        let b_pub = b_sk.public_hex();

        let a_keys = CryptoStore::derive_agreement(a_sk, &b_pub).unwrap();
        let b_keys = CryptoStore::derive_agreement(b_sk, &a_pub).unwrap();
        let topic = a_keys.settled_topic();
        assert_eq!(topic, b_keys.settled_topic());

        store.put_agreement(topic.clone(), a_keys);

        let ciphertext = store.encrypt(&topic, b"hello session").unwrap();

        store.put_agreement(topic.clone(), b_keys);
        let plaintext = store.decrypt(&topic, &ciphertext).unwrap();
        assert_eq!(plaintext, b"hello session");
    }

    #[test]
    fn decrypt_without_agreement_fails() {
        let store = CryptoStore::new();
        let topic = Topic::generate();
        assert!(matches!(
            store.decrypt(&topic, &[0u8; 20]),
            Err(CryptoError::KeyNotFound(_))
        ));
    }
}
