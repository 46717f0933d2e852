//! The `transport` module is responsible for network communication.
//!
//! - `codec` and `stream`: the raw TCP surface clients connect to, and the
//!   frame format spoken on it.
//! - `admin`, `message` and `client`: the WebSocket/JSON control surface used
//!   by trusted backend peers, and a client for it.

pub mod admin;
pub mod client;
pub mod codec;
pub mod message;
pub mod stream;

#[cfg(test)]
mod admin_tests;

pub use admin::{AdminService, serve_admin, start_admin_server};
pub use client::AdminClient;
pub use message::{AdminEnvelope, AdminRequest, AdminResponse};
pub use stream::{StreamConfig, serve_stream, start_stream_server};
