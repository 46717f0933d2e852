//! # topic-manager
//!
//! `topic-manager` is the broker side of a topic-based publish/subscribe
//! service. Clients hold persistent raw TCP connections; trusted backend peers
//! drive subscriptions and publishes through an admin control surface. Delivery
//! is in-memory, best-effort and at-most-once.
//!
//! ## Core Modules
//!
//! - `broker`: topic registry, message type and the delivery engine.
//! - `session`: per-connection sessions and the connection registry.
//! - `transport`: frame codec, stream acceptor, admin surface and its client.
//! - `config`: loading and merging configuration.
//! - `utils`: error types and log sink setup.

pub mod broker;
pub mod config;
pub mod session;
pub mod transport;
pub mod utils;

#[cfg(test)]
pub(crate) mod test_support;
