//! Session engine (§4.7): proposal, approval, and post-settlement JSON-RPC
//! request/response traffic, including the three-step payload validation
//! that rejects out-of-permission calls before they reach host code.
//!
//! Shares the pairing's shape but settles over its own topic, reached
//! through a "pre-settlement" channel: `session_propose` travels wrapped in
//! `pairing_payload` over the pairing's settled topic, and the pairing's
//! agreement key is temporarily copied onto the session's proposal topic so
//! `session_approve` can be exchanged before the session's own key exists.

use {
    crate::{
        crypto::{CryptoError, CryptoStore},
        domain::{AppMetadata, Participant, PendingStatus, Permissions, Relay as SequenceRelay, Sequence},
        relay::{FacadeError, InboundRequest, RelayFacade},
        rpc::{
            AppRequest, Method, PairingPayload, ProposedPermissions, Request, Response,
            SessionApprove, SessionDelete, SessionDeleteReason, SessionPayload, SessionPropose,
            SessionReject, SessionUpdate, SessionUpgrade,
        },
        store::{SequenceStore, StoreError},
        subscriber::Subscriber,
    },
    relay_client::Error as TransportError,
    relay_rpc::domain::Topic,
    std::{collections::HashSet, sync::Arc, time::Duration},
};

const REQUEST_TTL: Duration = Duration::from_secs(6 * 60 * 60);
const HANDSHAKE_TTL: Duration = Duration::from_secs(30);
pub const DEFAULT_SESSION_EXPIRY_SECS: i64 = 7 * 24 * 60 * 60;

/// §7 error taxonomy: JSON-RPC error codes returned to a peer whose
/// `session_payload` fails validation.
pub mod error_codes {
    pub const NO_SEQUENCE_FOR_TOPIC: i32 = -32000;
    pub const UNAUTHORIZED_TARGET_CHAIN: i32 = -32001;
    pub const UNAUTHORIZED_JSON_RPC_METHOD: i32 = -32002;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Facade(#[from] FacadeError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("no settled session for topic {0}")]
    NotSettled(Topic),

    #[error("{0} is not an authorized target chain for this session")]
    UnauthorizedTargetChain(String),

    #[error("{0} is not an authorized jsonrpc method for this session")]
    UnauthorizedJsonRpcMethod(String),

    #[error("payload did not carry a session proposal")]
    NotAProposal,
}

/// Parameters for proposing a session over an already-settled pairing.
#[derive(Debug, Clone)]
pub struct SessionProposeParams {
    pub pairing_topic: Topic,
    pub metadata: AppMetadata,
    pub relay: SequenceRelay,
    pub blockchains: HashSet<String>,
    pub jsonrpc_methods: HashSet<String>,
}

/// What `propose_session` hands back: the proposal the host must retain
/// (keyed by its topic) until the matching `session_approve` arrives.
#[derive(Debug, Clone)]
pub struct ProposedSession {
    pub topic: Topic,
    pub our_public_key: String,
    pub proposal: SessionPropose,
}

#[derive(Debug, Clone)]
pub struct SessionSettled {
    pub topic: Topic,
    pub accounts: Vec<String>,
}

/// A validated inbound session request handed to host code for a response.
#[derive(Debug, Clone)]
pub struct SessionRequest {
    pub topic: Topic,
    pub id: i64,
    pub chain_id: Option<String>,
    pub method: String,
    pub params: serde_json::Value,
}

pub struct SessionEngine {
    crypto: Arc<CryptoStore>,
    store: Arc<SequenceStore>,
    facade: Arc<RelayFacade>,
    subscriber: Subscriber,
}

impl SessionEngine {
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

    /// Proposer side — `propose_session(settled_pairing, permissions)`
    /// (§4.7): generates the session's own ephemeral secret and topic,
    /// installs the pairing's key onto it as a pre-settlement channel, and
    /// ships the proposal wrapped in `pairing_payload` over the pairing's
    /// settled topic.
    pub async fn propose_session(&self, params: SessionProposeParams) -> Result<ProposedSession, SessionError> {
        let session_topic = Topic::generate();
        let secret = self.crypto.generate_private_key();
        let our_public_key = self.crypto.put_private_key(secret);

        self.crypto.copy_agreement(&params.pairing_topic, session_topic.clone())?;
        self.subscriber.set_subscription(session_topic.clone()).await?;

        let proposal = SessionPropose {
            topic: session_topic.clone(),
            relay: params.relay,
            proposer: Participant {
                public_key: our_public_key.clone(),
                metadata: params.metadata,
            },
            permissions: ProposedPermissions {
                blockchains: params.blockchains,
                jsonrpc_methods: params.jsonrpc_methods,
            },
        };

        let inner = Request::new(self.facade.next_id(), Method::SessionPropose(proposal.clone()));
        let outer = Request::new(
            self.facade.next_id(),
            Method::PairingPayload(PairingPayload {
                request: Box::new(inner),
            }),
        );

        self.facade
            .publish_request(&params.pairing_topic, &outer, HANDSHAKE_TTL)
            .await?;

        Ok(ProposedSession {
            topic: session_topic,
            our_public_key,
            proposal,
        })
    }

    /// Unwraps an inbound `pairing_payload` carrying a `session_propose`,
    /// opening the pre-settlement channel on the responder's side, and
    /// acknowledges the outer request (§4.7, §4.4 ack semantics).
    pub async fn receive_proposal(
        &self,
        pairing_topic: &Topic,
        outer_id: i64,
        payload: &PairingPayload,
    ) -> Result<SessionPropose, SessionError> {
        let Method::SessionPropose(proposal) = &payload.request.method else {
            return Err(SessionError::NotAProposal);
        };

        self.crypto.copy_agreement(pairing_topic, proposal.topic.clone())?;

        let ack = Response::success(outer_id, serde_json::json!(true));
        self.facade.respond(pairing_topic, &ack, HANDSHAKE_TTL).await?;

        Ok(proposal.clone())
    }

    /// Responder side — `approve(proposal, accounts)` (§4.7): derives the
    /// real agreement, records a `Pending(Responded)` entry at the
    /// proposal's topic, and sends `session_approve` over the
    /// pre-settlement channel already opened by [`Self::receive_proposal`].
    pub async fn approve(
        &self,
        proposal: &SessionPropose,
        metadata: AppMetadata,
        accounts: Vec<String>,
    ) -> Result<SessionSettled, SessionError> {
        let responder_secret = self.crypto.generate_private_key();
        let responder_public = responder_secret.public_hex();
        let agreement = CryptoStore::derive_agreement(responder_secret, &proposal.proposer.public_key)?;
        let settled_topic = agreement.settled_topic();

        let this = Participant {
            public_key: responder_public.clone(),
            metadata,
        };

        self.store.insert(Sequence::Pending {
            status: PendingStatus::Responded,
            topic: proposal.topic.clone(),
            relay: proposal.relay.clone(),
            this: this.clone(),
            peer_public_key: Some(proposal.proposer.public_key.clone()),
            controller: false,
        })?;

        self.subscriber.set_subscription(proposal.topic.clone()).await?;

        let expiry = now_unix() + DEFAULT_SESSION_EXPIRY_SECS;
        let approve = Request::new(
            self.facade.next_id(),
            Method::SessionApprove(SessionApprove {
                responder: Participant {
                    public_key: responder_public,
                    metadata: AppMetadata::default(),
                },
                expiry,
                accounts: accounts.clone(),
                state: None,
            }),
        );

        // Travels under the pre-settlement (pairing-copied) key still
        // installed at `proposal.topic`.
        self.facade.publish_request(&proposal.topic, &approve, REQUEST_TTL).await?;

        let settled = Sequence::Settled {
            topic: settled_topic.clone(),
            relay: proposal.relay.clone(),
            this,
            peer: proposal.proposer.clone(),
            permissions: Permissions {
                blockchains: proposal.permissions.blockchains.clone(),
                jsonrpc_methods: proposal.permissions.jsonrpc_methods.clone(),
                controller_public_key: proposal.proposer.public_key.clone(),
            },
            expiry,
            controller: false,
        };

        self.crypto.put_agreement(settled_topic.clone(), agreement);
        self.store.migrate(&proposal.topic, settled_topic.clone(), settled)?;
        self.subscriber.set_subscription(settled_topic.clone()).await?;
        self.subscriber.remove_subscription(&proposal.topic).await?;

        Ok(SessionSettled {
            topic: settled_topic,
            accounts,
        })
    }

    /// Responder side — `reject(proposal, reason)` (§4.7): no state is
    /// persisted, since `approve` hadn't been called yet.
    pub async fn reject(&self, proposal: &SessionPropose, reason: impl Into<String>) -> Result<(), SessionError> {
        let reject = Request::new(
            self.facade.next_id(),
            Method::SessionReject(SessionReject {
                reason: reason.into(),
            }),
        );
        self.facade.publish_notification(&proposal.topic, &reject, HANDSHAKE_TTL).await?;
        self.crypto.drop_agreement(&proposal.topic);
        Ok(())
    }

    /// Proposer side — inbound `session_approve` on the proposal topic
    /// (§4.7): mirror of the pairing approve. Acknowledges the request,
    /// which resolves the responder's `publish_request` correlation.
    pub async fn handle_approve(
        &self,
        proposed: &ProposedSession,
        approve_event: &InboundRequest,
        approve: &SessionApprove,
    ) -> Result<SessionSettled, SessionError> {
        let our_secret = self.crypto.take_private_key(&proposed.our_public_key)?;
        let agreement = CryptoStore::derive_agreement(our_secret, &approve.responder.public_key)?;
        let settled_topic = agreement.settled_topic();
        self.crypto.put_agreement(settled_topic.clone(), agreement);

        self.store.insert(Sequence::Settled {
            topic: settled_topic.clone(),
            relay: proposed.proposal.relay.clone(),
            this: Participant {
                public_key: proposed.our_public_key.clone(),
                metadata: AppMetadata::default(),
            },
            peer: approve.responder.clone(),
            permissions: Permissions {
                blockchains: proposed.proposal.permissions.blockchains.clone(),
                jsonrpc_methods: proposed.proposal.permissions.jsonrpc_methods.clone(),
                controller_public_key: proposed.our_public_key.clone(),
            },
            expiry: approve.expiry,
            controller: true,
        })?;

        self.subscriber.set_subscription(settled_topic.clone()).await?;
        self.subscriber.remove_subscription(&proposed.topic).await?;

        let ack = Response::success(approve_event.request.id, serde_json::json!(true));
        self.facade.respond(&approve_event.topic, &ack, HANDSHAKE_TTL).await?;

        Ok(SessionSettled {
            topic: settled_topic,
            accounts: approve.accounts.clone(),
        })
    }

    /// Sends an app-level JSON-RPC call over a settled session and awaits
    /// its correlated response — `request(topic, method, params)` (§4.7).
    pub async fn request(
        &self,
        topic: &Topic,
        method: impl Into<String>,
        params: serde_json::Value,
        chain_id: Option<String>,
    ) -> Result<serde_json::Value, SessionError> {
        self.store.get_settled(topic)?;

        let req = Request::new(
            self.facade.next_id(),
            Method::SessionPayload(SessionPayload {
                request: AppRequest {
                    method: method.into(),
                    params,
                },
                chain_id,
            }),
        );

        match self.facade.publish_request(topic, &req, REQUEST_TTL).await? {
            Response::Success { result, .. } => Ok(result),
            Response::Error { error, .. } => Err(SessionError::Facade(FacadeError::Remote(error.code, error.message))),
        }
    }

    /// Replies to a previously validated [`SessionRequest`].
    pub async fn respond(&self, request: &SessionRequest, result: Result<serde_json::Value, (i32, String)>) -> Result<(), SessionError> {
        let response = match result {
            Ok(value) => Response::success(request.id, value),
            Err((code, message)) => Response::error(request.id, code, message),
        };
        self.facade.respond(&request.topic, &response, REQUEST_TTL).await?;
        Ok(())
    }

    /// Validates and unpacks an inbound `session_payload` (§7 payload
    /// validation): settled-entry check, then chain-id-in-permissions,
    /// then method-in-permissions. On failure, publishes the matching
    /// JSON-RPC error directly and returns it rather than handing the call
    /// to host code.
    pub async fn validate_payload(
        &self,
        topic: &Topic,
        id: i64,
        payload: &SessionPayload,
    ) -> Result<SessionRequest, SessionError> {
        let sequence = match self.store.get_settled(topic) {
            Ok(sequence) => sequence,
            Err(_) => {
                self.reply_error(topic, id, error_codes::NO_SEQUENCE_FOR_TOPIC, "no session for this topic").await;
                return Err(SessionError::NotSettled(topic.clone()));
            }
        };
        let Sequence::Settled { permissions, .. } = &sequence else {
            self.reply_error(topic, id, error_codes::NO_SEQUENCE_FOR_TOPIC, "no session for this topic").await;
            return Err(SessionError::NotSettled(topic.clone()));
        };

        if let Some(chain_id) = &payload.chain_id {
            if !permissions.blockchains.contains(chain_id) {
                self.reply_error(topic, id, error_codes::UNAUTHORIZED_TARGET_CHAIN, "unauthorized target chain").await;
                return Err(SessionError::UnauthorizedTargetChain(chain_id.clone()));
            }
        }

        if !permissions.jsonrpc_methods.contains(&payload.request.method) {
            self.reply_error(topic, id, error_codes::UNAUTHORIZED_JSON_RPC_METHOD, "unauthorized jsonrpc method").await;
            return Err(SessionError::UnauthorizedJsonRpcMethod(payload.request.method.clone()));
        }

        Ok(SessionRequest {
            topic: topic.clone(),
            id,
            chain_id: payload.chain_id.clone(),
            method: payload.request.method.clone(),
            params: payload.request.params.clone(),
        })
    }

    async fn reply_error(&self, topic: &Topic, id: i64, code: i32, message: &str) {
        let response = Response::error(id, code, message);
        if let Err(error) = self.facade.respond(topic, &response, REQUEST_TTL).await {
            tracing::debug!(%topic, %error, "failed to publish payload-validation error");
        }
    }

    /// `delete(topic, reason)` (§4.7): notifies the peer, then tears down
    /// local state — subscription first, then the agreement key, then the
    /// store entry.
    pub async fn delete(&self, topic: &Topic, code: u32, message: impl Into<String>) -> Result<(), SessionError> {
        let delete = Request::new(
            self.facade.next_id(),
            Method::SessionDelete(SessionDelete {
                reason: SessionDeleteReason {
                    code,
                    message: message.into(),
                },
            }),
        );
        self.facade.publish_notification(topic, &delete, REQUEST_TTL).await?;
        self.finish_delete(topic).await
    }

    /// Inbound `session_delete` handling: the peer initiated teardown.
    /// Does not publish anything back (§4.7 "inbound does not").
    pub async fn handle_delete(&self, topic: &Topic) -> Result<(), SessionError> {
        self.finish_delete(topic).await
    }

    async fn finish_delete(&self, topic: &Topic) -> Result<(), SessionError> {
        self.subscriber.remove_subscription(topic).await?;
        self.crypto.drop_agreement(topic);
        self.store.remove(topic);
        Ok(())
    }

    /// Sends a `session_update`. Stubbed (§9 open question): the request is
    /// published, but the local store's `permissions` is not mutated —
    /// there is no agreed wire format yet for which fields are authoritative
    /// on receipt.
    pub async fn update(&self, topic: &Topic, permissions: ProposedPermissions) -> Result<(), SessionError> {
        self.store.get_settled(topic)?;
        let update = Request::new(self.facade.next_id(), Method::SessionUpdate(SessionUpdate { permissions }));
        self.facade.publish_notification(topic, &update, REQUEST_TTL).await?;
        Ok(())
    }

    /// Sends a `session_upgrade`. Stubbed, see [`Self::update`].
    pub async fn upgrade(&self, topic: &Topic, permissions: ProposedPermissions) -> Result<(), SessionError> {
        self.store.get_settled(topic)?;
        let upgrade = Request::new(self.facade.next_id(), Method::SessionUpgrade(SessionUpgrade { permissions }));
        self.facade.publish_notification(topic, &upgrade, REQUEST_TTL).await?;
        Ok(())
    }

    /// Dispatch hook for inbound requests on settled session topics. The
    /// pre-settlement events (`pairing_payload`/`session_approve`) arrive
    /// on topics this engine's subscriber also tracks but need proposal
    /// context the top-level client holds, so they're routed there instead.
    pub async fn handle_inbound(&self, event: &InboundRequest) -> Result<Option<SessionRequest>, SessionError> {
        match &event.request.method {
            Method::SessionPayload(payload) => {
                let request = self.validate_payload(&event.topic, event.request.id, payload).await?;
                Ok(Some(request))
            }
            Method::SessionDelete(_) => {
                self.handle_delete(&event.topic).await?;
                Ok(None)
            }
            Method::SessionPing(()) => {
                let ack = Response::success(event.request.id, serde_json::json!(true));
                self.facade.respond(&event.topic, &ack, HANDSHAKE_TTL).await?;
                Ok(None)
            }
            _ => Ok(None),
        }
    }

    /// Re-subscribes every topic this engine's [`Subscriber`] tracks,
    /// refreshing the relay-issued `SubscriptionId` for each (§4.7 "both
    /// engines re-issue `set_subscription`" on reconnect).
    pub async fn restore_subscriptions(&self) -> Result<(), SessionError> {
        Ok(self.subscriber.restore().await?)
    }
}

fn now_unix() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settled_with_permissions(topic: Topic, blockchains: HashSet<String>, methods: HashSet<String>) -> Sequence {
        Sequence::Settled {
            topic,
            relay: SequenceRelay::waku(),
            this: Participant {
                public_key: "aa".repeat(32),
                metadata: AppMetadata::default(),
            },
            peer: Participant {
                public_key: "bb".repeat(32),
                metadata: AppMetadata::default(),
            },
            permissions: Permissions {
                blockchains,
                jsonrpc_methods: methods,
                controller_public_key: "aa".repeat(32),
            },
            expiry: i64::MAX,
            controller: true,
        }
    }

    #[test]
    fn settled_sequence_carries_the_permissions_back_out() {
        let topic = Topic::generate();
        let blockchains: HashSet<String> = ["eip155:1".to_owned()].into_iter().collect();
        let methods: HashSet<String> = ["personal_sign".to_owned()].into_iter().collect();
        let sequence = settled_with_permissions(topic.clone(), blockchains.clone(), methods.clone());

        let Sequence::Settled { permissions, .. } = &sequence else {
            panic!("expected settled sequence");
        };
        assert_eq!(permissions.blockchains, blockchains);
        assert_eq!(permissions.jsonrpc_methods, methods);
    }

}
