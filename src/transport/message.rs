//! Command envelope sent by clients.
//!
//! Every inbound data frame is a JSON object
//! `{ "type": "publish" | "subscribe" | "unsubscribe", "topic": "..." }`.
//! Other fields are ignored, so publishers are free to put their payload
//! next to the envelope. Missing fields decode as defaults: a frame without
//! `type` is an unknown command rather than an error.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommandKind {
    Publish,
    Subscribe,
    Unsubscribe,
    /// Anything else; ignored by the dispatcher.
    #[default]
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ClientMessage {
    #[serde(rename = "type", default)]
    pub kind: CommandKind,
    #[serde(default)]
    pub topic: String,
}

/// The frame was not a command envelope. Ends the connection.
#[derive(Debug, Error)]
#[error("malformed command: {0}")]
pub struct DecodeError(#[from] serde_json::Error);

impl ClientMessage {
    pub fn decode(frame: &[u8]) -> Result<Self, DecodeError> {
        Ok(serde_json::from_slice(frame)?)
    }
}
