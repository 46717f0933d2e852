//! Message definitions for the broker
//!
//! `Message` is the internal representation of everything that travels over a
//! stream connection. It is produced by decoding an inbound frame or by an
//! admin publish, handed to the delivery engine, and dropped after fanout.
//!
//! Notes on fields:
//! - `kind`: ordinary publish or a server heartbeat
//! - `message_id`: opaque id chosen by the publisher
//! - `source`: identifier of the publishing backend or client
//! - `topic`: topic name used for routing
//! - `payload`: opaque bytes, shared between subscribers without copying

use bytes::Bytes;

pub const HEARTBEAT_MESSAGE_ID: &str = "0";
pub const HEARTBEAT_SOURCE: &str = "system";
pub const HEARTBEAT_TOPIC: &str = "*";
pub const HEARTBEAT_PAYLOAD: &[u8] = b"heartbeat";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    Publish,
    Heartbeat,
}

impl MessageKind {
    pub fn as_u8(self) -> u8 {
        match self {
            MessageKind::Publish => 1,
            MessageKind::Heartbeat => 2,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(MessageKind::Publish),
            2 => Some(MessageKind::Heartbeat),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub kind: MessageKind,
    pub message_id: String,
    pub source: String,
    pub topic: String,
    pub payload: Bytes,
}

impl Message {
    pub fn publish(
        topic: impl Into<String>,
        message_id: impl Into<String>,
        source: impl Into<String>,
        payload: impl Into<Bytes>,
    ) -> Self {
        Self {
            kind: MessageKind::Publish,
            message_id: message_id.into(),
            source: source.into(),
            topic: topic.into(),
            payload: payload.into(),
        }
    }

    /// The liveness probe the server writes to each connection.
    pub fn heartbeat() -> Self {
        Self {
            kind: MessageKind::Heartbeat,
            message_id: HEARTBEAT_MESSAGE_ID.to_string(),
            source: HEARTBEAT_SOURCE.to_string(),
            topic: HEARTBEAT_TOPIC.to_string(),
            payload: Bytes::from_static(HEARTBEAT_PAYLOAD),
        }
    }

    pub fn is_heartbeat(&self) -> bool {
        self.kind == MessageKind::Heartbeat
    }
}
