//! Subscriber (§4.5): a topic-indexed dispatcher so two engines (pairing,
//! session) can share one relay connection without cross-talk.

use {
    dashmap::DashMap,
    relay_client::{Client as TransportClient, Error as TransportError},
    relay_rpc::domain::{SubscriptionId, Topic},
    std::sync::Arc,
};

/// Tracks the set of topics this client is subscribed to and mirrors
/// `set_subscription`/`remove_subscription` onto the relay transport.
#[derive(Clone)]
pub struct Subscriber {
    transport: Arc<TransportClient>,
    topics: Arc<DashMap<Topic, SubscriptionId>>,
}

impl Subscriber {
    pub fn new(transport: Arc<TransportClient>) -> Self {
        Self {
            transport,
            topics: Arc::new(DashMap::new()),
        }
    }

    /// Returns whether `topic` is currently tracked, the gate every inbound
    /// request is filtered through before reaching an engine callback.
    pub fn contains(&self, topic: &Topic) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.topics.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Adds `topic` to the set and subscribes on the relay. Idempotent: a
    /// topic already tracked is not re-subscribed.
    pub async fn set_subscription(&self, topic: Topic) -> Result<(), TransportError> {
        if self.topics.contains_key(&topic) {
            return Ok(());
        }
        let subscription_id = self.transport.subscribe(topic.clone()).await?;
        self.topics.insert(topic, subscription_id);
        Ok(())
    }

    /// Removes `topic` from the set and unsubscribes on the relay. A no-op
    /// if `topic` isn't tracked.
    pub async fn remove_subscription(&self, topic: &Topic) -> Result<(), TransportError> {
        let Some((_, subscription_id)) = self.topics.remove(topic) else {
            return Ok(());
        };
        self.transport.unsubscribe(topic.clone(), subscription_id).await
    }

    /// Re-subscribes every currently tracked topic and replaces its stored
    /// `SubscriptionId` (§4.7 "restore on reconnect"). Unlike
    /// `set_subscription`, this is not idempotent by design: a reconnect
    /// means the relay has forgotten the old subscription, so the old id is
    /// stale regardless of whether the topic is still tracked here.
    pub async fn restore(&self) -> Result<(), TransportError> {
        for topic in self.topics() {
            let subscription_id = self.transport.subscribe(topic.clone()).await?;
            self.topics.insert(topic, subscription_id);
        }
        Ok(())
    }
}
