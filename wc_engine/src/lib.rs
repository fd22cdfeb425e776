//! The pairing and session protocol engine: X25519 handshakes, an encrypted
//! JSON-RPC envelope over the relay transport, and the pairing/session state
//! machines built on top of it.

pub mod client;
pub mod config;
pub mod crypto;
pub mod domain;
pub mod logging;
pub mod pairing;
pub mod pairing_uri;
pub mod relay;
pub mod rpc;
pub mod serializer;
pub mod session;
pub mod store;
pub mod subscriber;

pub use client::Client;
pub use config::ClientConfig;
