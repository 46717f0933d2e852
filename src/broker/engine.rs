//! Broker engine
//!
//! `Broker` ties the two shared registries together and implements delivery:
//! resolve a topic to its subscribers, look each one up in the connection
//! registry, and write the encoded frame to every live transport.
//!
//! Concurrency and usage notes:
//! - `Broker` is a cheap handle (`Clone` shares the registries). Every session
//!   and the admin service hold one; tests build isolated instances.
//! - Delivery works on a snapshot of the subscriber list, so registry locks
//!   are never held across network I/O.
//! - Writes go through `Session::write_frame`, which serializes writers per
//!   target transport. Concurrent fanouts to the same subscriber never
//!   interleave frame bytes, and unrelated subscribers never wait on each other.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, warn};

use crate::broker::message::Message;
use crate::broker::topic::TopicRegistry;
use crate::session::ConnectionRegistry;
use crate::transport::codec;
use crate::utils::error::BrokerError;

/// Outcome of one fanout.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DeliveryReport {
    /// Identities resolved for the topic.
    pub subscribers: usize,
    /// Live sessions the frame was written to.
    pub delivered: usize,
    /// Identities with no live session.
    pub skipped: usize,
    /// Sessions closed because the write failed.
    pub evicted: usize,
}

#[derive(Debug, Default, Clone)]
pub struct Broker {
    topics: Arc<TopicRegistry>,
    connections: Arc<ConnectionRegistry>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_registries(topics: Arc<TopicRegistry>, connections: Arc<ConnectionRegistry>) -> Self {
        Self {
            topics,
            connections,
        }
    }

    pub fn topics(&self) -> &TopicRegistry {
        &self.topics
    }

    pub fn connections(&self) -> &ConnectionRegistry {
        &self.connections
    }

    /// Fan `message` out to every current subscriber of its topic.
    ///
    /// Fails with `TopicNotFound` when the topic has no registry entry; in that
    /// case nothing is written. A failed write evicts that subscriber and the
    /// remaining subscribers still receive the message.
    pub async fn deliver(&self, message: &Message) -> Result<DeliveryReport, BrokerError> {
        let subscribers = self
            .topics
            .resolve(&message.topic)
            .ok_or_else(|| BrokerError::TopicNotFound(message.topic.clone()))?;
        let frame = codec::encode_to_bytes(message)?;

        let mut report = DeliveryReport {
            subscribers: subscribers.len(),
            ..DeliveryReport::default()
        };

        let mut targets = Vec::with_capacity(subscribers.len());
        for id in &subscribers {
            match self.connections.get(id) {
                Some(session) => targets.push(session),
                // subscribed by identity before the connection exists, or
                // after it went away and before cleanup finished
                None => report.skipped += 1,
            }
        }

        let writes = targets.iter().map(|session| {
            let frame = &frame;
            async move { (session, session.write_frame(frame).await) }
        });

        for (session, result) in join_all(writes).await {
            match result {
                Ok(()) => report.delivered += 1,
                Err(e) => {
                    warn!(
                        connection = %session.identity(),
                        topic = %message.topic,
                        error = %e,
                        "delivery failed, evicting connection"
                    );
                    session.close().await;
                    report.evicted += 1;
                }
            }
        }

        debug!(
            topic = %message.topic,
            message_id = %message.message_id,
            subscribers = report.subscribers,
            delivered = report.delivered,
            skipped = report.skipped,
            evicted = report.evicted,
            "message delivered"
        );

        Ok(report)
    }
}
