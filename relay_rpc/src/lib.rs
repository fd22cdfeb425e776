//! Domain types and the relay's JSON-RPC wire format, shared between the
//! transport client and the protocol engine.

#[macro_use]
pub mod macros;
pub mod domain;
pub mod rpc;
