//! The sequence data model (§3): participants, permissions, and the
//! `Pending`/`Settled` sequence shape shared by pairings and sessions.

use {
    relay_rpc::domain::Topic,
    serde::{Deserialize, Serialize},
    std::collections::HashSet,
};

/// Opaque, protocol-agnostic app metadata carried by a [`Participant`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    pub icons: Vec<String>,
}

/// One side of a sequence: its X25519 public key (hex) and app metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    pub public_key: String,
    pub metadata: AppMetadata,
}

/// The relay a sequence is reachable on. Opaque beyond its protocol tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Relay {
    pub protocol: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

impl Relay {
    pub fn waku() -> Self {
        Self {
            protocol: "waku".to_owned(),
            data: None,
        }
    }
}

/// Session permissions (§3): chain/method allow-lists plus the controller
/// public key, the single party authorized to mutate the session
/// post-settlement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permissions {
    pub blockchains: HashSet<String>,
    pub jsonrpc_methods: HashSet<String>,
    pub controller_public_key: String,
}

/// Status of a [`Sequence::Pending`] entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingStatus {
    Proposed,
    Responded,
}

/// A sequence (pairing or session): a tagged union, not a class hierarchy
/// (§9 "State-machine shape over inheritance"). Transitions are total
/// functions over `(current variant, event)`, implemented by the pairing and
/// session engines rather than on this type itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status")]
pub enum Sequence {
    Pending {
        status: PendingStatus,
        topic: Topic,
        relay: Relay,
        #[serde(rename = "self")]
        this: Participant,
        /// The peer's public key once known (proposer side before
        /// settlement never has it; responder side does, post-pair).
        #[serde(default, skip_serializing_if = "Option::is_none")]
        peer_public_key: Option<String>,
        controller: bool,
    },
    Settled {
        topic: Topic,
        relay: Relay,
        #[serde(rename = "self")]
        this: Participant,
        peer: Participant,
        permissions: Permissions,
        /// Unix seconds.
        expiry: i64,
        controller: bool,
    },
}

impl Sequence {
    pub fn topic(&self) -> &Topic {
        match self {
            Self::Pending { topic, .. } => topic,
            Self::Settled { topic, .. } => topic,
        }
    }

    pub fn is_settled(&self) -> bool {
        matches!(self, Self::Settled { .. })
    }

    pub fn as_settled(&self) -> Option<&Self> {
        self.is_settled().then_some(self)
    }
}
