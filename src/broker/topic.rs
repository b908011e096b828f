//! Topic management
//!
//! A `Topic` holds the endpoints subscribed to one topic name. Subscriptions
//! are keyed by endpoint id, so subscribing the same endpoint twice is a
//! no-op.
//!
//! Concurrency note: callers must synchronize access to `Topic` (the
//! registry lock does this).

use std::collections::HashMap;

use crate::client::{Endpoint, EndpointId};

#[derive(Debug, Default)]
pub struct Topic {
    subscribers: HashMap<EndpointId, Endpoint>,
}

impl Topic {
    /// Add a subscriber to the topic. Duplicate adds are ignored.
    pub fn subscribe(&mut self, endpoint: &Endpoint) {
        self.subscribers
            .entry(endpoint.id())
            .or_insert_with(|| endpoint.clone());
    }

    /// Remove a subscriber from the topic.
    pub fn unsubscribe(&mut self, id: &EndpointId) {
        self.subscribers.remove(id);
    }

    pub fn contains(&self, id: &EndpointId) -> bool {
        self.subscribers.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    pub fn subscribers(&self) -> impl Iterator<Item = &Endpoint> {
        self.subscribers.values()
    }
}
