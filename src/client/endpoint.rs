use bytes::Bytes;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

pub type EndpointId = Uuid;

/// Receiving half of an endpoint's queue, drained by the owning connection.
pub type Outbox = mpsc::Receiver<Bytes>;

/// Outcome of a single non-blocking delivery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Delivered,
    /// The queue was at capacity; the message was dropped.
    Full,
    /// The owning connection has gone away; the message was dropped.
    Closed,
}

/// Delivery handle for one connected client.
///
/// Each endpoint is identified by a unique `id` assigned at creation. Clones
/// share that id and refer to the same queue; the registry keys on the id.
#[derive(Debug, Clone)]
pub struct Endpoint {
    id: EndpointId,
    sender: mpsc::Sender<Bytes>,
}

impl Endpoint {
    /// Creates a fresh endpoint with a queue holding at most `capacity`
    /// messages (at least one).
    pub fn channel(capacity: usize) -> (Self, Outbox) {
        let (sender, outbox) = mpsc::channel(capacity.max(1));
        let endpoint = Self {
            id: Uuid::new_v4(),
            sender,
        };
        (endpoint, outbox)
    }

    pub fn id(&self) -> EndpointId {
        self.id
    }

    /// Attempts to enqueue `message` without waiting.
    pub fn try_deliver(&self, message: Bytes) -> Delivery {
        match self.sender.try_send(message) {
            Ok(()) => Delivery::Delivered,
            Err(TrySendError::Full(_)) => Delivery::Full,
            Err(TrySendError::Closed(_)) => Delivery::Closed,
        }
    }
}
