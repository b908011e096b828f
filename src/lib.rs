//! # PopHub
//!
//! `pophub` is a minimal, in-memory publish/subscribe hub served over
//! WebSockets. Clients send `subscribe`, `unsubscribe` and `publish`
//! commands as JSON frames; a published frame is forwarded unchanged to every
//! connection currently subscribed to its topic.
//!
//! ## Core Modules
//!
//! - `broker`: the topic registry and its fan-out. Delivery is best effort:
//!   a subscriber whose queue is full misses the message instead of slowing
//!   the publisher down.
//! - `client`: the per-connection endpoint the registry delivers into.
//! - `config`: loading server configuration from files and environment.
//! - `transport`: command decoding, per-connection sessions and the
//!   WebSocket server.
//! - `utils`: startup errors and logging.

pub mod broker;
pub mod client;
pub mod config;
pub mod transport;
pub mod utils;
