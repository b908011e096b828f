//! Connection session
//!
//! A session owns one endpoint and runs two loops for its connection:
//! - the inbound loop reads frames, decodes them and applies them to the
//!   registry;
//! - the outbound loop, spawned as its own task, drains the endpoint queue
//!   into the network sink.
//!
//! Whichever loop stops first (peer closed, read error, malformed command,
//! write error) raises a `watch` close signal that stops the other one. Only
//! the inbound loop changes the endpoint's subscriptions, so the endpoint is
//! removed from the registry once, after that loop has exited.
//!
//! The session is generic over its sink and source so that it can run on the
//! split halves of a WebSocket as well as on in-memory channels.

use std::fmt;
use std::sync::Arc;

use bytes::Bytes;
use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, warn};
use tungstenite::Utf8Bytes;
use tungstenite::protocol::Message as WsMessage;

use crate::broker::Registry;
use crate::client::{Endpoint, EndpointId, Outbox};
use crate::transport::dispatch::handle_frame;
use crate::transport::message::DecodeError;

/// Why a session ended.
#[derive(Debug)]
pub enum CloseReason {
    /// The peer closed the connection or sent a close frame.
    PeerClosed,
    Read(String),
    Decode(DecodeError),
    Write(String),
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::PeerClosed => write!(f, "peer closed the connection"),
            CloseReason::Read(e) => write!(f, "read failed: {e}"),
            CloseReason::Decode(e) => write!(f, "{e}"),
            CloseReason::Write(e) => write!(f, "write failed: {e}"),
        }
    }
}

pub struct Session {
    registry: Arc<Registry>,
    endpoint: Endpoint,
    outbox: Outbox,
}

impl Session {
    /// Creates a session with a fresh endpoint whose queue holds at most
    /// `queue_capacity` messages.
    pub fn new(registry: Arc<Registry>, queue_capacity: usize) -> Self {
        let (endpoint, outbox) = Endpoint::channel(queue_capacity);
        Self {
            registry,
            endpoint,
            outbox,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Runs the session until either direction fails, then unregisters the
    /// endpoint.
    pub async fn run<S, R, E>(self, sink: S, mut source: R) -> CloseReason
    where
        S: Sink<WsMessage> + Unpin + Send + 'static,
        S::Error: fmt::Display + Send,
        R: Stream<Item = Result<WsMessage, E>> + Unpin,
        E: fmt::Display,
    {
        let Session {
            registry,
            endpoint,
            outbox,
        } = self;
        let (closed_tx, mut closed) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);

        let writer = tokio::spawn(write_loop(
            sink,
            outbox,
            endpoint.id(),
            closed.clone(),
            closed_tx.clone(),
        ));

        let inbound = loop {
            tokio::select! {
                biased;
                _ = closed.changed() => break None,
                frame = source.next() => {
                    let frame = match frame {
                        None => break Some(CloseReason::PeerClosed),
                        Some(Err(e)) => break Some(CloseReason::Read(e.to_string())),
                        Some(Ok(frame)) => frame,
                    };
                    let data = match frame {
                        WsMessage::Text(text) => Bytes::from(text),
                        WsMessage::Binary(data) => data,
                        WsMessage::Close(_) => break Some(CloseReason::PeerClosed),
                        // pings are answered by the WebSocket layer
                        WsMessage::Ping(_) | WsMessage::Pong(_) | WsMessage::Frame(_) => {
                            continue;
                        }
                    };
                    if let Err(e) = handle_frame(&registry, &endpoint, data) {
                        break Some(CloseReason::Decode(e));
                    }
                }
            }
        };

        // the inbound loop is gone, nothing can subscribe this endpoint again
        registry.unsubscribe_all(&endpoint);
        closed_tx.send_replace(true);
        let outbound = match writer.await {
            Ok(reason) => reason,
            Err(e) => {
                warn!(endpoint = %endpoint.id(), "write loop aborted: {e}");
                None
            }
        };

        inbound.or(outbound).unwrap_or(CloseReason::PeerClosed)
    }
}

async fn write_loop<S>(
    mut sink: S,
    mut outbox: Outbox,
    id: EndpointId,
    mut closed: watch::Receiver<bool>,
    close: Arc<watch::Sender<bool>>,
) -> Option<CloseReason>
where
    S: Sink<WsMessage> + Unpin,
    S::Error: fmt::Display,
{
    let reason = loop {
        tokio::select! {
            biased;
            _ = closed.changed() => break None,
            message = outbox.recv() => {
                let Some(payload) = message else { break None };
                // a stalled sink must not outlive teardown
                tokio::select! {
                    biased;
                    _ = closed.changed() => break None,
                    sent = sink.send(outbound_frame(payload)) => {
                        if let Err(e) = sent {
                            warn!(endpoint = %id, "failed to send message: {e}");
                            break Some(CloseReason::Write(e.to_string()));
                        }
                    }
                }
            }
        }
    };

    close.send_replace(true);
    if let Err(e) = sink.close().await {
        debug!(endpoint = %id, "closing sink failed: {e}");
    }
    debug!(endpoint = %id, "send loop closed");
    reason
}

/// Published frames are forwarded as text when they are valid UTF-8, which
/// every decodable command is.
fn outbound_frame(payload: Bytes) -> WsMessage {
    Utf8Bytes::try_from(payload.clone())
        .map_or_else(|_| WsMessage::Binary(payload), WsMessage::Text)
}
