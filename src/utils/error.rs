//! The `error` module defines the error types used within `topic-manager`.
//!
//! Each layer gets its own enum so callers can match on exactly the failures
//! that layer can produce:
//!
//! - `FrameError`: the frame codec rejected bytes or a message.
//! - `BrokerError`: a publish could not be fanned out.
//! - `SessionError`: a write to one connection failed.
//! - `ServerError`: a listener could not be started.
//! - `AdminClientError`: a call against the admin surface failed.

use std::io;
use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("skipped {skipped} bytes that do not start a frame")]
    Garbage { skipped: usize },

    #[error("unknown message kind {0}")]
    UnknownKind(u8),

    #[error("{field} is {len} bytes, longer than the frame allows")]
    FieldTooLong { field: &'static str, len: usize },

    #[error("payload of {len} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { len: usize, max: usize },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },
}

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("topic not found: {0}")]
    TopicNotFound(String),

    #[error("failed to encode message: {0}")]
    Encode(#[from] FrameError),
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection is closed")]
    Closed,

    #[error("write timed out after {0:?}")]
    WriteTimeout(Duration),

    #[error("transport error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Error)]
pub enum AdminClientError {
    #[error("websocket error: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("invalid admin message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("admin connection closed before a response arrived")]
    Closed,

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("unexpected response: {0}")]
    UnexpectedResponse(String),
}
