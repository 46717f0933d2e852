//! Administrative control surface
//!
//! Trusted backend peers use this surface to publish into a topic,
//! subscribe or unsubscribe a connection identity, and read subscriber
//! counts. It bypasses the stream sessions and talks to the broker directly.
//!
//! Transport: each WebSocket text message carries one `AdminEnvelope`
//! wrapping an `AdminRequest`. Every request runs on its own task and its
//! response carries the request's `id`, so responses can come back out of
//! order. At most `MAX_IN_FLIGHT` requests per connection are outstanding;
//! past that the connection is not read until a reply has been queued.

use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, mpsc};
use tokio_tungstenite::accept_async;
use tracing::{debug, error, info, warn};
use tungstenite::protocol::Message as WsMessage;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use serde_json::Value;

use crate::broker::message::Message;
use crate::broker::{Broker, DeliveryReport};
use crate::transport::message::{AdminEnvelope, AdminRequest, AdminResponse};
use crate::utils::error::{BrokerError, ServerError};

/// Requests one admin connection may have outstanding at a time.
pub const MAX_IN_FLIGHT: usize = 64;

#[derive(Debug, Clone)]
pub struct AdminService {
    broker: Broker,
}

impl AdminService {
    pub fn new(broker: Broker) -> Self {
        Self { broker }
    }

    /// Fan a message out to `topic`. Fails only when the topic is not
    /// registered; success does not mean any subscriber received it.
    pub async fn publish(
        &self,
        topic: &str,
        message_id: &str,
        source: &str,
        payload: Bytes,
    ) -> Result<DeliveryReport, BrokerError> {
        info!(%topic, %message_id, %source, bytes = payload.len(), "new message");
        let message = Message::publish(topic, message_id, source, payload);
        self.broker.deliver(&message).await
    }

    pub fn subscribe_topic(&self, ip: &str, topics: &[String]) {
        for topic in topics {
            self.broker.topics().subscribe(topic, ip);
        }
        debug!(connection = %ip, ?topics, "subscribed");
    }

    pub fn unsubscribe_topic(&self, ip: &str, topics: &[String]) {
        for topic in topics {
            self.broker.topics().unsubscribe(topic, ip);
        }
        debug!(connection = %ip, ?topics, "unsubscribed");
    }

    pub fn get_connect_num(&self, topic: &str) -> u64 {
        self.broker.topics().subscriber_count(topic)
    }

    pub async fn handle(&self, request: AdminRequest) -> AdminResponse {
        match request {
            AdminRequest::Publish {
                topic,
                message_id,
                source,
                payload,
            } => match self
                .publish(&topic, &message_id, &source, Bytes::from(payload))
                .await
            {
                Ok(_) => AdminResponse::Published {
                    ok: true,
                    error: None,
                },
                Err(e) => AdminResponse::Published {
                    ok: false,
                    error: Some(e.to_string()),
                },
            },
            AdminRequest::SubscribeTopic { ip, topics } => {
                self.subscribe_topic(&ip, &topics);
                AdminResponse::Subscribed {}
            }
            AdminRequest::UnSubscribeTopic { ip, topics } => {
                self.unsubscribe_topic(&ip, &topics);
                AdminResponse::Unsubscribed {}
            }
            AdminRequest::GetConnectNum { topic } => AdminResponse::ConnectNum {
                number: self.get_connect_num(&topic),
            },
        }
    }

    /// Decode one text frame, run it and encode the reply.
    ///
    /// The reply echoes the request's `id` whenever the text is a JSON object
    /// with a string `id`, even if the rest of the request is invalid.
    pub async fn handle_text(&self, text: &str) -> AdminEnvelope<AdminResponse> {
        let value: Value = match serde_json::from_str(text) {
            Ok(value) => value,
            Err(err) => return invalid_request(String::new(), text, &err),
        };
        let id = value
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        match serde_json::from_value::<AdminEnvelope<AdminRequest>>(value) {
            Ok(AdminEnvelope { id, body }) => AdminEnvelope::new(id, self.handle(body).await),
            Err(err) => invalid_request(id, text, &err),
        }
    }
}

fn invalid_request(id: String, text: &str, err: &serde_json::Error) -> AdminEnvelope<AdminResponse> {
    warn!(
        error = %err,
        %id,
        text = %text.chars().take(100).collect::<String>(),
        "invalid admin message"
    );
    AdminEnvelope::new(
        id,
        AdminResponse::Error {
            message: format!("invalid request: {err}"),
        },
    )
}

/// Bind `addr` and serve the admin surface. A bind failure is returned to
/// the caller; once listening, this only returns if the listener does.
pub async fn start_admin_server(addr: &str, broker: Broker) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    info!(%addr, "admin service listening");
    serve_admin(listener, broker).await;
    Ok(())
}

pub async fn serve_admin(listener: TcpListener, broker: Broker) {
    let service = AdminService::new(broker);

    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                tokio::spawn(handle_admin_connection(stream, peer, service.clone()));
            }
            Err(e) => {
                error!(error = %e, "admin service accept error");
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

async fn handle_admin_connection(stream: TcpStream, peer: SocketAddr, service: AdminService) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%peer, error = %e, "admin websocket handshake error");
            return;
        }
    };
    debug!(%peer, "admin peer connected");

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let (tx, mut rx) = mpsc::channel::<WsMessage>(MAX_IN_FLIGHT);
    let in_flight = Arc::new(Semaphore::new(MAX_IN_FLIGHT));

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if let Err(e) = ws_sender.send(msg).await {
                debug!(%peer, error = %e, "failed to send admin response");
                break;
            }
        }
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(WsMessage::Text(text)) => {
                // stop reading while the peer has too many requests outstanding
                let Ok(permit) = Arc::clone(&in_flight).acquire_owned().await else {
                    break;
                };
                let service = service.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let reply = service.handle_text(text.as_str()).await;
                    match serde_json::to_string(&reply) {
                        Ok(json) => {
                            let _ = tx.send(WsMessage::text(json)).await;
                        }
                        Err(e) => error!(error = %e, "failed to serialize admin response"),
                    }
                    drop(permit);
                });
            }
            Ok(WsMessage::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%peer, error = %e, "admin connection error");
                break;
            }
        }
    }

    // the writer drains once every in-flight request has replied
    drop(tx);
    let _ = writer.await;
    debug!(%peer, "admin peer disconnected");
}
