//! The `client` module defines the per-connection side of the hub.
//!
//! It provides the `Endpoint` type: the delivery handle the registry pushes
//! published messages into, and the bounded queue its connection drains.

pub mod endpoint;
pub use endpoint::{Delivery, Endpoint, EndpointId, Outbox};
