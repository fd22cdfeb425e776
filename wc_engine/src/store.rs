//! Sequence store (§3): the persistent `topic -> Pending | Settled` map.
//! Exclusively owns sequence records; engines always re-read through this
//! store rather than caching a sequence across an await point.

use {
    crate::domain::Sequence,
    dashmap::DashMap,
    relay_rpc::domain::Topic,
};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("no sequence for topic {0}")]
    NoSequenceForTopic(Topic),

    #[error("a sequence already exists for topic {0}")]
    TopicCollision(Topic),
}

/// Topic-indexed store of pairing/session sequences. Atomic per-entry
/// replace on [`SequenceStore::migrate`] (§6 "crash-consistent per entry" —
/// in-memory here, but structured so a persistent backend can swap in
/// without changing the engines' call shape).
#[derive(Debug, Default)]
pub struct SequenceStore {
    sequences: DashMap<Topic, Sequence>,
}

impl SequenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, sequence: Sequence) -> Result<(), StoreError> {
        let topic = sequence.topic().clone();
        if self.sequences.contains_key(&topic) {
            return Err(StoreError::TopicCollision(topic));
        }
        self.sequences.insert(topic, sequence);
        Ok(())
    }

    pub fn get(&self, topic: &Topic) -> Result<Sequence, StoreError> {
        self.sequences
            .get(topic)
            .map(|entry| entry.clone())
            .ok_or_else(|| StoreError::NoSequenceForTopic(topic.clone()))
    }

    pub fn get_settled(&self, topic: &Topic) -> Result<Sequence, StoreError> {
        let sequence = self.get(topic)?;
        if sequence.is_settled() {
            Ok(sequence)
        } else {
            Err(StoreError::NoSequenceForTopic(topic.clone()))
        }
    }

    pub fn remove(&self, topic: &Topic) -> Option<Sequence> {
        self.sequences.remove(topic).map(|(_, sequence)| sequence)
    }

    /// Moves a sequence from `old_topic` to `new_topic` under `new_value`,
    /// the settlement transition (§3 "migrate store entry from T to settled
    /// topic"). Never leaves both the old entry present and the new one
    /// missing: the old entry is removed only after the new one is
    /// inserted.
    pub fn migrate(
        &self,
        old_topic: &Topic,
        new_topic: Topic,
        new_value: Sequence,
    ) -> Result<(), StoreError> {
        if &new_topic != old_topic && self.sequences.contains_key(&new_topic) {
            return Err(StoreError::TopicCollision(new_topic));
        }
        let topic_changed = &new_topic != old_topic;
        self.sequences.insert(new_topic, new_value);
        if topic_changed {
            self.sequences.remove(old_topic);
        }
        Ok(())
    }

    pub fn topics(&self) -> Vec<Topic> {
        self.sequences.iter().map(|entry| entry.key().clone()).collect()
    }

    /// Pure sweep over settled sequences past `now` (unix seconds). Returns
    /// the removed topics; the caller is responsible for unsubscribing and
    /// dropping their agreement keys (§3, reserved GC hook; no timer lives
    /// in this store).
    pub fn sweep_expired(&self, now: i64) -> Vec<Topic> {
        let expired: Vec<Topic> = self
            .sequences
            .iter()
            .filter_map(|entry| match entry.value() {
                Sequence::Settled { expiry, .. } if *expiry <= now => Some(entry.key().clone()),
                _ => None,
            })
            .collect();

        for topic in &expired {
            self.sequences.remove(topic);
        }

        expired
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::domain::{AppMetadata, Participant, PendingStatus, Relay},
    };

    fn pending(topic: Topic) -> Sequence {
        Sequence::Pending {
            status: PendingStatus::Proposed,
            topic,
            relay: Relay::waku(),
            this: Participant {
                public_key: "aa".repeat(32),
                metadata: AppMetadata::default(),
            },
            peer_public_key: None,
            controller: true,
        }
    }

    #[test]
    fn insert_then_get_round_trips() {
        let store = SequenceStore::new();
        let topic = Topic::generate();
        store.insert(pending(topic.clone())).unwrap();
        assert_eq!(store.get(&topic).unwrap().topic(), &topic);
    }

    #[test]
    fn duplicate_topic_is_rejected() {
        let store = SequenceStore::new();
        let topic = Topic::generate();
        store.insert(pending(topic.clone())).unwrap();
        assert!(matches!(
            store.insert(pending(topic)),
            Err(StoreError::TopicCollision(_))
        ));
    }

    #[test]
    fn missing_topic_errors() {
        let store = SequenceStore::new();
        let topic = Topic::generate();
        assert!(matches!(
            store.get(&topic),
            Err(StoreError::NoSequenceForTopic(_))
        ));
    }

    #[test]
    fn migrate_moves_entry_to_new_topic() {
        let store = SequenceStore::new();
        let old_topic = Topic::generate();
        store.insert(pending(old_topic.clone())).unwrap();

        let new_topic = Topic::generate();
        let settled = Sequence::Settled {
            topic: new_topic.clone(),
            relay: Relay::waku(),
            this: Participant {
                public_key: "bb".repeat(32),
                metadata: AppMetadata::default(),
            },
            peer: Participant {
                public_key: "cc".repeat(32),
                metadata: AppMetadata::default(),
            },
            permissions: crate::domain::Permissions {
                blockchains: Default::default(),
                jsonrpc_methods: Default::default(),
                controller_public_key: "bb".repeat(32),
            },
            expiry: i64::MAX,
            controller: true,
        };

        store
            .migrate(&old_topic, new_topic.clone(), settled)
            .unwrap();

        assert!(store.get(&old_topic).is_err());
        assert!(store.get(&new_topic).unwrap().is_settled());
    }

    #[test]
    fn sweep_expired_removes_only_past_expiry_settled() {
        let store = SequenceStore::new();
        let topic = Topic::generate();
        store
            .insert(Sequence::Settled {
                topic: topic.clone(),
                relay: Relay::waku(),
                this: Participant {
                    public_key: "dd".repeat(32),
                    metadata: AppMetadata::default(),
                },
                peer: Participant {
                    public_key: "ee".repeat(32),
                    metadata: AppMetadata::default(),
                },
                permissions: crate::domain::Permissions {
                    blockchains: Default::default(),
                    jsonrpc_methods: Default::default(),
                    controller_public_key: "dd".repeat(32),
                },
                expiry: 0,
                controller: true,
            })
            .unwrap();

        let removed = store.sweep_expired(1);
        assert_eq!(removed, vec![topic.clone()]);
        assert!(store.get(&topic).is_err());
    }
}
