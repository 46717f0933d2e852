//! The `session` module holds the per-connection side of the manager.
//!
//! `Session` owns one accepted transport and its receive, send and heartbeat
//! loops; `ConnectionRegistry` maps connection identities to live sessions so
//! the delivery engine can find the transport behind a subscriber.

pub mod connection;
pub mod registry;

pub use connection::{Session, SessionOptions, SessionReader, SessionState, SessionWriter};
pub use registry::ConnectionRegistry;
