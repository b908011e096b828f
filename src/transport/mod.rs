//! The `transport` module is responsible for handling network communication
//! with clients via WebSockets.
//!
//! It defines the command envelope clients send, maps commands onto the
//! registry, runs one session per connection and implements the WebSocket
//! server itself.

pub mod dispatch;
pub mod message;
pub mod session;
pub mod websocket;

pub use message::{ClientMessage, CommandKind, DecodeError};
pub use session::{CloseReason, Session};
pub use websocket::{serve, start_websocket_server};

#[cfg(test)]
mod tests;
