//! Topic registry
//!
//! The registry keeps two indexes that are exact inverses of each other:
//! topic name -> subscribed endpoints, and endpoint -> topic names. Both live
//! behind a single `RwLock`, so every operation observes and leaves them
//! consistent.
//!
//! Concurrency notes:
//! - `subscribe`, `unsubscribe` and `unsubscribe_all` take the write lock.
//! - `publish` takes the read lock and hands the message to each subscriber
//!   with a non-blocking `try_send`. A subscriber whose queue is full simply
//!   misses the message, so publishing never waits on a slow consumer.
//! - The lock is synchronous and must never be held across an `.await`.
//!
//! Topics and endpoint entries are pruned as soon as they become empty.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use parking_lot::RwLock;
use tracing::trace;

use crate::broker::topic::Topic;
use crate::client::{Delivery, Endpoint, EndpointId};

#[derive(Debug, Default)]
struct Index {
    topics: HashMap<String, Topic>,
    endpoints: HashMap<EndpointId, HashSet<String>>,
}

/// Shared topic <-> subscriber index.
///
/// One instance is created at startup and handed to every connection as an
/// `Arc<Registry>`. Tests create as many independent instances as they like.
#[derive(Debug, Default)]
pub struct Registry {
    index: RwLock<Index>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `endpoint` to `topic`, creating the topic on demand.
    /// Subscribing twice has no further effect.
    pub fn subscribe(&self, topic: &str, endpoint: &Endpoint) {
        let mut index = self.index.write();
        index
            .topics
            .entry(topic.to_string())
            .or_default()
            .subscribe(endpoint);
        index
            .endpoints
            .entry(endpoint.id())
            .or_default()
            .insert(topic.to_string());
    }

    /// Removes `endpoint` from `topic`. Does nothing if it was not subscribed.
    pub fn unsubscribe(&self, topic: &str, endpoint: &Endpoint) {
        let mut index = self.index.write();
        let id = endpoint.id();

        if let Some(subscribers) = index.topics.get_mut(topic) {
            subscribers.unsubscribe(&id);
            if subscribers.is_empty() {
                index.topics.remove(topic);
            }
        }
        if let Some(topics) = index.endpoints.get_mut(&id) {
            topics.remove(topic);
            if topics.is_empty() {
                index.endpoints.remove(&id);
            }
        }
    }

    /// Removes `endpoint` from every topic it is subscribed to.
    ///
    /// Runs once when a connection closes; calling it again, or for an
    /// endpoint without subscriptions, is a no-op.
    pub fn unsubscribe_all(&self, endpoint: &Endpoint) {
        let mut index = self.index.write();
        let id = endpoint.id();

        let Some(topics) = index.endpoints.remove(&id) else {
            return;
        };
        for topic in topics {
            if let Some(subscribers) = index.topics.get_mut(&topic) {
                subscribers.unsubscribe(&id);
                if subscribers.is_empty() {
                    index.topics.remove(&topic);
                }
            }
        }
    }

    /// Offers `message` to every current subscriber of `topic`.
    ///
    /// Subscribers whose queue is full, or whose connection is already gone,
    /// do not receive it. Publishing to a topic nobody listens to is a no-op.
    pub fn publish(&self, topic: &str, message: Bytes) {
        let index = self.index.read();
        let Some(subscribers) = index.topics.get(topic) else {
            return;
        };

        for endpoint in subscribers.subscribers() {
            match endpoint.try_deliver(message.clone()) {
                Delivery::Delivered => {}
                Delivery::Full => {
                    trace!(endpoint = %endpoint.id(), topic, "queue full, message dropped");
                }
                Delivery::Closed => {
                    trace!(endpoint = %endpoint.id(), topic, "endpoint closed, message dropped");
                }
            }
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.index.read().topics.get(topic).map_or(0, Topic::len)
    }

    pub fn is_subscribed(&self, topic: &str, endpoint: &Endpoint) -> bool {
        self.index
            .read()
            .topics
            .get(topic)
            .is_some_and(|subscribers| subscribers.contains(&endpoint.id()))
    }

    /// Topics `endpoint` is subscribed to, sorted.
    pub fn topics_of(&self, endpoint: &Endpoint) -> Vec<String> {
        let mut topics: Vec<String> = self
            .index
            .read()
            .endpoints
            .get(&endpoint.id())
            .map(|topics| topics.iter().cloned().collect())
            .unwrap_or_default();
        topics.sort();
        topics
    }

    /// Number of topics with at least one subscriber.
    pub fn topic_count(&self) -> usize {
        self.index.read().topics.len()
    }

    /// Panics unless both indexes are exact inverses with no empty entries.
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let index = self.index.read();

        for (name, topic) in &index.topics {
            assert!(!topic.is_empty(), "empty topic {name:?} left behind");
            for endpoint in topic.subscribers() {
                let reverse = index
                    .endpoints
                    .get(&endpoint.id())
                    .unwrap_or_else(|| panic!("{} missing from endpoint index", endpoint.id()));
                assert!(reverse.contains(name), "{name:?} missing for {}", endpoint.id());
            }
        }

        for (id, topics) in &index.endpoints {
            assert!(!topics.is_empty(), "empty topic set left for {id}");
            for name in topics {
                let topic = index
                    .topics
                    .get(name)
                    .unwrap_or_else(|| panic!("topic {name:?} missing from topic index"));
                assert!(topic.contains(id), "{id} missing from {name:?}");
            }
        }
    }
}
