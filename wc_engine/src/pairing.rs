//! Pairing engine (§4.6): `Proposed -> (URI shared) -> Responded -> Settled
//! -> Deleted`.

use {
    crate::{
        crypto::{CryptoError, CryptoStore},
        domain::{AppMetadata, Participant, PendingStatus, Relay as SequenceRelay, Sequence},
        pairing_uri::{self, PairingUri},
        relay::{FacadeError, InboundRequest, RelayFacade},
        rpc::{self, Method, PairingApprove, Request},
        store::{SequenceStore, StoreError},
        subscriber::Subscriber,
    },
    relay_client::Error as TransportError,
    relay_rpc::domain::Topic,
    std::{sync::Arc, time::Duration},
};

/// Relay-side TTL for handshake messages (§5 "30 seconds for handshake
/// messages").
const HANDSHAKE_TTL: Duration = Duration::from_secs(30);

/// Default pairing lifetime once settled, in seconds (30 days, matching the
/// protocol's usual pairing expiry).
pub const DEFAULT_PAIRING_EXPIRY_SECS: i64 = 30 * 24 * 60 * 60;

#[derive(Debug, thiserror::Error)]
pub enum PairingError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Facade(#[from] FacadeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("pairing proposal generation failed: {0}")]
    ProposalGeneration(String),

    #[error("malformed pairing uri: {0}")]
    UriInit(#[from] pairing_uri::ParseError),

    #[error("both sides designated themselves as controller")]
    UnauthorizedMatchingController,

    #[error("no settled pairing for topic {0}")]
    NoSequenceForTopic(Topic),
}

/// Parameters for proposing a new pairing.
#[derive(Debug, Clone)]
pub struct ProposeParams {
    pub metadata: AppMetadata,
    pub is_controller: bool,
    pub relay: SequenceRelay,
}

/// Emitted when a pairing settles, either as proposer or responder (§4.6).
#[derive(Debug, Clone)]
pub struct PairingSettled {
    pub settled_topic: Topic,
    pub pending_topic: Topic,
    pub peer_public_key: String,
}

/// The pairing state machine proper. Holds no transport state of its own —
/// everything routes through [`RelayFacade`] and [`SequenceStore`].
pub struct PairingEngine {
    crypto: Arc<CryptoStore>,
    store: Arc<SequenceStore>,
    facade: Arc<RelayFacade>,
    subscriber: Subscriber,
}

impl PairingEngine {
    pub fn new(
        crypto: Arc<CryptoStore>,
        store: Arc<SequenceStore>,
        facade: Arc<RelayFacade>,
        subscriber: Subscriber,
    ) -> Self {
        Self {
            crypto,
            store,
            facade,
            subscriber,
        }
    }

    /// Proposer side — `propose(params)` (§4.6): generates a fresh topic
    /// and X25519 secret, stores a `Pending` entry, and returns the pairing
    /// URI to hand to the responder out of band.
    pub async fn propose(&self, params: ProposeParams) -> Result<String, PairingError> {
        let topic = Topic::generate();
        let secret = self.crypto.generate_private_key();
        let public_key = secret.public_hex();
        self.crypto.put_private_key(secret);

        let sequence = Sequence::Pending {
            status: PendingStatus::Proposed,
            topic: topic.clone(),
            relay: params.relay.clone(),
            this: Participant {
                public_key: public_key.clone(),
                metadata: params.metadata,
            },
            peer_public_key: None,
            controller: params.is_controller,
        };
        self.store.insert(sequence)?;

        self.subscriber.set_subscription(topic.clone()).await?;

        let uri = PairingUri {
            topic: topic.as_ref().to_owned(),
            version: pairing_uri::VERSION.to_owned(),
            controller: params.is_controller,
            public_key,
            relay: params.relay,
        };

        Ok(uri.to_string())
    }

    /// Responder side — `pair(uri)` (§4.6).
    pub async fn pair(&self, uri: &str, is_controller: bool, metadata: AppMetadata) -> Result<PairingSettled, PairingError> {
        let parsed: PairingUri = uri.parse()?;

        if parsed.controller == is_controller {
            return Err(PairingError::UnauthorizedMatchingController);
        }

        let proposal_topic: Topic = parsed
            .topic
            .parse()
            .map_err(|_| PairingError::ProposalGeneration("invalid topic in uri".to_owned()))?;

        let responder_secret = self.crypto.generate_private_key();
        let responder_public = responder_secret.public_hex();
        let agreement = CryptoStore::derive_agreement(responder_secret, &parsed.public_key)?;
        let settled_topic = agreement.settled_topic();

        self.crypto.put_agreement(settled_topic.clone(), agreement);
        // Both the proposal and settled topics stay subscribed until the
        // approve is acknowledged; afterwards only the settled topic (§3).
        self.subscriber.set_subscription(settled_topic.clone()).await?;
        self.subscriber.set_subscription(proposal_topic.clone()).await?;

        let expiry = now_unix() + DEFAULT_PAIRING_EXPIRY_SECS;
        let approve = Request::new(
            self.facade.next_id(),
            Method::PairingApprove(PairingApprove {
                responder: Participant {
                    public_key: responder_public.clone(),
                    metadata: metadata.clone(),
                },
                expiry,
                state: None,
            }),
        );

        // No agreement is installed under the proposal topic on either
        // side, so the serializer sends this in the clear (§4.6 step 4);
        // the request/response correlation still applies as normal.
        self.facade
            .publish_request(&proposal_topic, &approve, HANDSHAKE_TTL)
            .await?;
        self.subscriber.remove_subscription(&proposal_topic).await?;

        self.store.insert(Sequence::Settled {
            topic: settled_topic.clone(),
            relay: parsed.relay.clone(),
            this: Participant {
                public_key: responder_public,
                metadata,
            },
            peer: Participant {
                public_key: parsed.public_key.clone(),
                metadata: AppMetadata::default(),
            },
            permissions: crate::domain::Permissions {
                blockchains: Default::default(),
                jsonrpc_methods: Default::default(),
                controller_public_key: if parsed.controller {
                    parsed.public_key.clone()
                } else {
                    String::new()
                },
            },
            expiry,
            controller: is_controller,
        })?;

        Ok(PairingSettled {
            settled_topic,
            pending_topic: proposal_topic,
            peer_public_key: parsed.public_key,
        })
    }

    /// Proposer-side handling of an inbound `pairing_approve` on the
    /// proposal topic (§4.6).
    pub async fn handle_approve(
        &self,
        proposal_topic: &Topic,
        approve: &PairingApprove,
    ) -> Result<PairingSettled, PairingError> {
        let pending = self.store.get(proposal_topic)?;
        let Sequence::Pending { this, controller, .. } = &pending else {
            return Err(PairingError::NoSequenceForTopic(proposal_topic.clone()));
        };
        let controller = *controller;

        let our_secret = self.crypto.take_private_key(&this.public_key)?;
        let agreement = CryptoStore::derive_agreement(our_secret, &approve.responder.public_key)?;
        let settled_topic = agreement.settled_topic();
        self.crypto.put_agreement(settled_topic.clone(), agreement);

        let settled = Sequence::Settled {
            topic: settled_topic.clone(),
            relay: match &pending {
                Sequence::Pending { relay, .. } => relay.clone(),
                Sequence::Settled { relay, .. } => relay.clone(),
            },
            this: this.clone(),
            peer: approve.responder.clone(),
            permissions: crate::domain::Permissions {
                blockchains: Default::default(),
                jsonrpc_methods: Default::default(),
                controller_public_key: this.public_key.clone(),
            },
            expiry: approve.expiry,
            controller,
        };

        self.store.migrate(proposal_topic, settled_topic.clone(), settled)?;
        self.subscriber.set_subscription(settled_topic.clone()).await?;
        self.subscriber.remove_subscription(proposal_topic).await?;
        self.crypto.drop_agreement(proposal_topic);

        Ok(PairingSettled {
            settled_topic,
            pending_topic: proposal_topic.clone(),
            peer_public_key: approve.responder.public_key.clone(),
        })
    }

    /// Dispatch hook for inbound requests the subscriber routed to this
    /// engine. Only `pairing_approve` is handled inline here; the host
    /// client routes `pairing_payload` onward to the session engine.
    ///
    /// Acknowledges the request on success, which is what resolves the
    /// responder's `publish_request` correlation for `pairing_approve`.
    pub async fn handle_inbound(&self, event: &InboundRequest) -> Result<Option<PairingSettled>, PairingError> {
        match &event.request.method {
            Method::PairingApprove(approve) => {
                let settled = self.handle_approve(&event.topic, approve).await?;
                let ack = rpc::Response::success(event.request.id, serde_json::json!(true));
                self.facade.respond(&event.topic, &ack, HANDSHAKE_TTL).await?;
                Ok(Some(settled))
            }
            Method::PairingPing(()) => {
                let ack = rpc::Response::success(event.request.id, serde_json::json!(true));
                self.facade.respond(&event.topic, &ack, HANDSHAKE_TTL).await?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Re-subscribes every topic this engine's [`Subscriber`] tracks,
    /// refreshing the relay-issued `SubscriptionId` for each (§4.7 "both
    /// engines re-issue `set_subscription`" on reconnect).
    pub async fn restore_subscriptions(&self) -> Result<(), PairingError> {
        Ok(self.subscriber.restore().await?)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
