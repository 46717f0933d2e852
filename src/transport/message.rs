//! JSON messages of the admin surface.
//!
//! Requests and responses are internally tagged by `type` and wrapped in an
//! `AdminEnvelope` whose `id` the server echoes back, e.g.
//!
//! ```json
//! {"id":"7","type":"get_connect_num","topic":"news"}
//! {"id":"7","type":"connect_num","number":2}
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct AdminEnvelope<T> {
    #[serde(default)]
    pub id: String,
    #[serde(flatten)]
    pub body: T,
}

impl<T> AdminEnvelope<T> {
    pub fn new(id: impl Into<String>, body: T) -> Self {
        Self {
            id: id.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum AdminRequest {
    #[serde(rename = "publish")]
    Publish {
        topic: String,
        message_id: String,
        source: String,
        /// Base64 on the wire.
        #[serde(with = "base64_payload")]
        payload: Vec<u8>,
    },
    #[serde(rename = "subscribe_topic")]
    SubscribeTopic { ip: String, topics: Vec<String> },
    #[serde(rename = "unsubscribe_topic")]
    UnSubscribeTopic { ip: String, topics: Vec<String> },
    #[serde(rename = "get_connect_num")]
    GetConnectNum { topic: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "type")]
pub enum AdminResponse {
    #[serde(rename = "published")]
    Published {
        ok: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    #[serde(rename = "subscribed")]
    Subscribed {},
    #[serde(rename = "unsubscribed")]
    Unsubscribed {},
    #[serde(rename = "connect_num")]
    ConnectNum { number: u64 },
    #[serde(rename = "error")]
    Error { message: String },
}

mod base64_payload {
    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(payload: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(payload))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
