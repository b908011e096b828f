//! Maps decoded commands onto registry operations.

use bytes::Bytes;
use tracing::debug;

use crate::broker::Registry;
use crate::client::Endpoint;
use crate::transport::message::{ClientMessage, CommandKind, DecodeError};

/// Applies `command` on behalf of `endpoint`.
///
/// `frame` is the raw frame the command was decoded from; for a publish it is
/// forwarded to subscribers unchanged.
pub fn dispatch(
    registry: &Registry,
    endpoint: &Endpoint,
    command: &ClientMessage,
    frame: Bytes,
) {
    let topic = command.topic.as_str();
    match command.kind {
        CommandKind::Publish => {
            registry.publish(topic, frame);
            debug!(endpoint = %endpoint.id(), topic, "published");
        }
        CommandKind::Subscribe => {
            registry.subscribe(topic, endpoint);
            debug!(endpoint = %endpoint.id(), topic, "subscribed");
        }
        CommandKind::Unsubscribe => {
            registry.unsubscribe(topic, endpoint);
            debug!(endpoint = %endpoint.id(), topic, "unsubscribed");
        }
        CommandKind::Unknown => {
            debug!(endpoint = %endpoint.id(), "ignoring unknown command");
        }
    }
}

/// Decodes one inbound frame and dispatches it.
pub fn handle_frame(
    registry: &Registry,
    endpoint: &Endpoint,
    frame: Bytes,
) -> Result<(), DecodeError> {
    let command = ClientMessage::decode(&frame)?;
    dispatch(registry, endpoint, &command, frame);
    Ok(())
}
