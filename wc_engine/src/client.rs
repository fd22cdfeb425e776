//! The top-level client (§0, §7): wires crypto, the sequence store, the
//! relay façade, and the pairing/session engines together, and runs the
//! dispatch loop that routes inbound requests to the right engine and
//! surfaces protocol events to a host-supplied [`Delegate`].

use {
    crate::{
        config::ClientConfig,
        crypto::CryptoStore,
        domain::Relay as SequenceRelay,
        pairing::{PairingEngine, PairingError, PairingSettled, ProposeParams},
        relay::{InboundRequest, RelayFacade},
        rpc::{Method, ProposedPermissions, SessionPropose},
        session::{ProposedSession, SessionEngine, SessionError, SessionProposeParams, SessionRequest, SessionSettled},
        store::SequenceStore,
        subscriber::Subscriber,
    },
    dashmap::DashMap,
    relay_client::{ConnectionOptions, Error as TransportError},
    relay_rpc::domain::Topic,
    std::{collections::HashSet, sync::Arc},
};

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Pairing(#[from] PairingError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

/// Host-implemented sink for protocol events (§6 delegate events). Every
/// method has a no-op default so a host only overrides what it needs.
pub trait Delegate: Send + Sync + 'static {
    fn on_pairing_settled(&self, _settled: &PairingSettled) {}
    fn on_session_proposal(&self, _pairing_topic: &Topic, _proposal: &SessionPropose) {}
    fn on_session_settled(&self, _settled: &SessionSettled) {}
    fn on_session_rejected(&self, _topic: &Topic, _reason: &str) {}
    fn on_session_request(&self, _request: &SessionRequest) {}
    fn on_session_deleted(&self, _topic: &Topic) {}
}

/// A delegate that does nothing, the default for a [`Client`] built without
/// one.
pub struct NoopDelegate;
impl Delegate for NoopDelegate {}

/// The pairing-and-session protocol engine (§0 "top-level client").
pub struct Client {
    config: ClientConfig,
    crypto: Arc<CryptoStore>,
    store: Arc<SequenceStore>,
    facade: Arc<RelayFacade>,
    pairing: Arc<PairingEngine>,
    session: Arc<SessionEngine>,
    /// Proposals awaiting their `session_approve`, keyed by the proposal's
    /// own topic. Shared with the dispatch loop, which pops an entry out
    /// when the matching approve arrives.
    outstanding_proposals: Arc<DashMap<Topic, ProposedSession>>,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_delegate(config, Arc::new(NoopDelegate))
    }

    pub fn with_delegate(config: ClientConfig, delegate: Arc<dyn Delegate>) -> Self {
        let crypto = Arc::new(CryptoStore::new());
        let store = Arc::new(SequenceStore::new());
        let facade = Arc::new(RelayFacade::new(crypto.clone(), config.correlation_timeout));

        let pairing_subscriber = Subscriber::new(facade.transport());
        let session_subscriber = Subscriber::new(facade.transport());

        let pairing = Arc::new(PairingEngine::new(crypto.clone(), store.clone(), facade.clone(), pairing_subscriber));
        let session = Arc::new(SessionEngine::new(crypto.clone(), store.clone(), facade.clone(), session_subscriber));

        let outstanding_proposals = Arc::new(DashMap::new());

        spawn_dispatch_loop(
            facade.clone(),
            pairing.clone(),
            session.clone(),
            outstanding_proposals.clone(),
            delegate,
        );

        Self {
            config,
            crypto,
            store,
            facade,
            pairing,
            session,
            outstanding_proposals,
        }
    }

    pub async fn connect(&self) -> Result<(), ClientError> {
        let opts = ConnectionOptions::new(self.config.relay_address.clone(), self.config.api_key.as_transport_key())
            .with_origin(self.config.origin.clone());
        self.facade.transport().connect(opts).await?;
        Ok(())
    }

    pub async fn disconnect(&self) -> Result<(), ClientError> {
        self.facade.transport().disconnect().await?;
        Ok(())
    }

    /// Proposer side: generates a pairing and returns the URI to share with
    /// a responder out of band.
    pub async fn propose_pairing(&self) -> Result<String, ClientError> {
        Ok(self
            .pairing
            .propose(ProposeParams {
                metadata: self.config.metadata.clone(),
                is_controller: self.config.is_controller,
                relay: SequenceRelay::waku(),
            })
            .await?)
    }

    /// Responder side: consumes a pairing URI and settles the pairing.
    pub async fn pair(&self, uri: &str) -> Result<PairingSettled, ClientError> {
        Ok(self.pairing.pair(uri, self.config.is_controller, self.config.metadata.clone()).await?)
    }

    /// Proposer side: proposes a session over an already-settled pairing.
    /// The returned `ProposedSession` is retained in `outstanding_proposals`,
    /// keyed by its own topic, so the dispatch loop can match the eventual
    /// `session_approve` back to this proposal.
    pub async fn propose_session(
        &self,
        pairing_topic: Topic,
        blockchains: HashSet<String>,
        jsonrpc_methods: HashSet<String>,
    ) -> Result<Topic, ClientError> {
        let proposed = self
            .session
            .propose_session(SessionProposeParams {
                pairing_topic,
                metadata: self.config.metadata.clone(),
                relay: SequenceRelay::waku(),
                blockchains,
                jsonrpc_methods,
            })
            .await?;

        let topic = proposed.topic.clone();
        self.outstanding_proposals.insert(topic.clone(), proposed);
        Ok(topic)
    }

    /// Responder side: approves a proposal surfaced via
    /// [`Delegate::on_session_proposal`].
    pub async fn approve_session(&self, proposal: &SessionPropose, accounts: Vec<String>) -> Result<SessionSettled, ClientError> {
        Ok(self.session.approve(proposal, self.config.metadata.clone(), accounts).await?)
    }

    /// Responder side: rejects a proposal surfaced via
    /// [`Delegate::on_session_proposal`].
    pub async fn reject_session(&self, proposal: &SessionPropose, reason: impl Into<String>) -> Result<(), ClientError> {
        Ok(self.session.reject(proposal, reason).await?)
    }

    /// Sends a host-application JSON-RPC call over a settled session.
    pub async fn request(
        &self,
        topic: &Topic,
        method: impl Into<String>,
        params: serde_json::Value,
        chain_id: Option<String>,
    ) -> Result<serde_json::Value, ClientError> {
        Ok(self.session.request(topic, method, params, chain_id).await?)
    }

    /// Replies to a [`SessionRequest`] surfaced via
    /// [`Delegate::on_session_request`].
    pub async fn respond(&self, request: &SessionRequest, result: Result<serde_json::Value, (i32, String)>) -> Result<(), ClientError> {
        Ok(self.session.respond(request, result).await?)
    }

    /// Tears down a settled session, notifying the peer.
    pub async fn delete_session(&self, topic: &Topic, code: u32, message: impl Into<String>) -> Result<(), ClientError> {
        Ok(self.session.delete(topic, code, message).await?)
    }

    /// Sends `session_update`. Stubbed (§9 open question): see
    /// [`crate::session::SessionEngine::update`].
    pub async fn update_session(&self, topic: &Topic, permissions: ProposedPermissions) -> Result<(), ClientError> {
        Ok(self.session.update(topic, permissions).await?)
    }

    /// Sends `session_upgrade`. Stubbed, see [`Self::update_session`].
    pub async fn upgrade_session(&self, topic: &Topic, permissions: ProposedPermissions) -> Result<(), ClientError> {
        Ok(self.session.upgrade(topic, permissions).await?)
    }

    /// Pure GC sweep: removes expired settled sequences from the store and
    /// drops their subscriptions/keys. No timer drives this; callers decide
    /// their own cadence (§3, §9 reserved sweep hook).
    pub async fn sweep_expired(&self, now: i64) {
        for topic in self.store.sweep_expired(now) {
            self.crypto.drop_agreement(&topic);
        }
    }

    pub fn crypto(&self) -> &Arc<CryptoStore> {
        &self.crypto
    }

    pub fn store(&self) -> &Arc<SequenceStore> {
        &self.store
    }
}

/// Routes every decoded inbound request to the owning engine and turns the
/// result into a [`Delegate`] callback. Runs for the lifetime of the
/// [`Client`]; ends when the façade's broadcast sender is dropped.
fn spawn_dispatch_loop(
    facade: Arc<RelayFacade>,
    pairing: Arc<PairingEngine>,
    session: Arc<SessionEngine>,
    outstanding_proposals: Arc<DashMap<Topic, ProposedSession>>,
    delegate: Arc<dyn Delegate>,
) {
    let mut inbound = facade.inbound_requests();
    let mut reconnects = facade.connection_events();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                event = inbound.recv() => {
                    let Ok(event) = event else { break };
                    dispatch(&pairing, &session, &outstanding_proposals, &delegate, event).await;
                }
                reconnect = reconnects.recv() => {
                    if reconnect.is_err() {
                        break;
                    }
                    // Restore on reconnect (§4.7): both engines re-issue
                    // `set_subscription` for every topic they track, through
                    // their own `Subscriber` so tracked ids stay accurate.
                    if let Err(error) = pairing.restore_subscriptions().await {
                        tracing::debug!(%error, "failed to restore pairing subscriptions on reconnect");
                    }
                    if let Err(error) = session.restore_subscriptions().await {
                        tracing::debug!(%error, "failed to restore session subscriptions on reconnect");
                    }
                }
            }
        }
    });
}

async fn dispatch(
    pairing: &Arc<PairingEngine>,
    session: &Arc<SessionEngine>,
    outstanding_proposals: &Arc<DashMap<Topic, ProposedSession>>,
    delegate: &Arc<dyn Delegate>,
    event: InboundRequest,
) {
    match &event.request.method {
        Method::PairingApprove(_) => match pairing.handle_inbound(&event).await {
            Ok(Some(settled)) => delegate.on_pairing_settled(&settled),
            Ok(None) => {}
            Err(error) => tracing::debug!(%error, "pairing_approve handling failed"),
        },

        Method::PairingPayload(payload) => match session.receive_proposal(&event.topic, event.request.id, payload).await {
            Ok(proposal) => delegate.on_session_proposal(&event.topic, &proposal),
            Err(error) => tracing::debug!(%error, "session proposal handling failed"),
        },

        Method::SessionApprove(approve) => {
            let Some((_, proposed)) = outstanding_proposals.remove(&event.topic) else {
                tracing::debug!(topic = %event.topic, "session_approve with no outstanding proposal");
                return;
            };
            match session.handle_approve(&proposed, &event, approve).await {
                Ok(settled) => delegate.on_session_settled(&settled),
                Err(error) => tracing::debug!(%error, "session_approve handling failed"),
            }
        }

        Method::SessionReject(reject) => {
            outstanding_proposals.remove(&event.topic);
            delegate.on_session_rejected(&event.topic, &reject.reason);
        }

        Method::SessionPayload(_) => match session.handle_inbound(&event).await {
            Ok(Some(request)) => delegate.on_session_request(&request),
            Ok(None) => {}
            Err(error) => tracing::debug!(%error, "session_payload validation failed"),
        },

        Method::SessionDelete(_) => {
            if session.handle_inbound(&event).await.is_ok() {
                delegate.on_session_deleted(&event.topic);
            }
        }

        Method::PairingPing(()) => {
            if let Err(error) = pairing.handle_inbound(&event).await {
                tracing::debug!(%error, "pairing_ping handling failed");
            }
        }

        Method::SessionPing(()) => {
            if let Err(error) = session.handle_inbound(&event).await {
                tracing::debug!(%error, "session_ping handling failed");
            }
        }

        // session_update/session_upgrade are reserved wire slots with no
        // local-state mutation yet (§9 open question).
        Method::SessionUpdate(_) | Method::SessionUpgrade(_) => {}

        // session_propose only ever travels wrapped in pairing_payload; a
        // bare top-level one is a malformed or hostile message.
        Method::SessionPropose(_) => {
            tracing::debug!(topic = %event.topic, "dropping unwrapped session_propose");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::SecretApiKey, domain::AppMetadata};

    #[tokio::test]
    async fn client_exposes_a_fresh_pairing_uri() {
        let config = ClientConfig::new(SecretApiKey::new("key"), AppMetadata::default());
        let client = Client::new(config);
        let uri = client.propose_pairing().await.unwrap();
        assert!(uri.starts_with("wc:"));
    }
}
