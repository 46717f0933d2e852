//! Topic management
//!
//! A `Topic` holds the subscriber entries for one topic name: each entry maps
//! a connection identity to an interest count, so a connection that subscribes
//! twice is still a single fanout target but needs two unsubscribes to leave.
//!
//! `TopicRegistry` is the shared topic -> subscribers map. It is backed by a
//! `DashMap`, so every operation locks only the shard holding its topic.
//! Topics in different shards never contend; topics that share a shard are
//! serialized against each other for the duration of one short map operation.
//! No lock is held once an operation returns, in particular not while the
//! delivery engine writes to transports.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use indexmap::IndexMap;

pub type SubscriberId = String;

/// Subscriber entries of a single topic, in subscription order.
///
/// Invariant: every stored interest count is at least 1.
#[derive(Debug, Default)]
pub struct Topic {
    pub name: String,
    subscribers: IndexMap<SubscriberId, u64>,
}

impl Topic {
    /// Create a new topic with the given name and no subscribers.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            subscribers: IndexMap::new(),
        }
    }

    /// Add one unit of interest for `id`, creating its entry if needed.
    pub fn subscribe(&mut self, id: &str) {
        match self.subscribers.get_mut(id) {
            Some(count) => *count += 1,
            None => {
                self.subscribers.insert(id.to_string(), 1);
            }
        }
    }

    /// Remove one unit of interest for `id`; the entry goes away at zero.
    ///
    /// Returns `false` if `id` had no entry.
    pub fn unsubscribe(&mut self, id: &str) -> bool {
        match self.subscribers.get_mut(id) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.subscribers.shift_remove(id);
                true
            }
            None => false,
        }
    }

    /// Drop the entry for `id` whatever its count.
    pub fn remove(&mut self, id: &str) -> bool {
        self.subscribers.shift_remove(id).is_some()
    }

    pub fn interest_count(&self, id: &str) -> u64 {
        self.subscribers.get(id).copied().unwrap_or(0)
    }

    /// Sum of interest counts over all entries.
    pub fn subscriber_count(&self) -> u64 {
        self.subscribers.values().sum()
    }

    pub fn subscriber_ids(&self) -> impl Iterator<Item = &SubscriberId> {
        self.subscribers.keys()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct TopicRegistry {
    topics: DashMap<String, Topic>,
}

impl TopicRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes a connection to a topic. Automatically creates the topic if it doesn't exist.
    pub fn subscribe(&self, topic: &str, id: &str) {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| Topic::new(topic))
            .subscribe(id);
    }

    /// Removes one unit of interest. Unknown topics and identities are ignored.
    ///
    /// A topic left without subscribers is removed in the same critical section.
    pub fn unsubscribe(&self, topic: &str, id: &str) {
        if let Entry::Occupied(mut entry) = self.topics.entry(topic.to_string()) {
            entry.get_mut().unsubscribe(id);
            if entry.get().is_empty() {
                entry.remove();
            }
        }
    }

    /// Total interest on `topic`, 0 if the topic is not registered.
    pub fn subscriber_count(&self, topic: &str) -> u64 {
        self.topics
            .get(topic)
            .map(|t| t.subscriber_count())
            .unwrap_or(0)
    }

    /// Full unsubscribe of `id` from every topic, used when its connection is gone.
    pub fn remove_connection(&self, id: &str) {
        self.topics.retain(|_, topic| {
            topic.remove(id);
            !topic.is_empty()
        });
    }

    /// Snapshot of the identities subscribed to `topic`, or `None` if the
    /// topic is not registered.
    pub fn resolve(&self, topic: &str) -> Option<Vec<SubscriberId>> {
        self.topics
            .get(topic)
            .map(|t| t.subscriber_ids().cloned().collect())
    }

    pub fn contains(&self, topic: &str) -> bool {
        self.topics.contains_key(topic)
    }

    pub fn interest_count(&self, topic: &str, id: &str) -> u64 {
        self.topics
            .get(topic)
            .map(|t| t.interest_count(id))
            .unwrap_or(0)
    }

    pub fn topic_count(&self) -> usize {
        self.topics.len()
    }

    pub fn topics(&self) -> Vec<String> {
        self.topics.iter().map(|t| t.key().clone()).collect()
    }
}
