//! Client for the admin surface, used by backend peers and the CLI.

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tungstenite::protocol::Message as WsMessage;
use uuid::Uuid;

use crate::transport::message::{AdminEnvelope, AdminRequest, AdminResponse};
use crate::utils::error::AdminClientError;

pub struct AdminClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl AdminClient {
    /// Connect to an admin endpoint such as `ws://127.0.0.1:6667`.
    pub async fn connect(url: &str) -> Result<Self, AdminClientError> {
        let (ws, _response) = connect_async(url).await?;
        Ok(Self { ws })
    }

    /// Send one request and wait for the response carrying the same id.
    pub async fn call(&mut self, request: AdminRequest) -> Result<AdminResponse, AdminClientError> {
        let id = Uuid::new_v4().to_string();
        let text = serde_json::to_string(&AdminEnvelope::new(id.clone(), request))?;
        self.ws.send(WsMessage::text(text)).await?;

        loop {
            match self.ws.next().await {
                Some(Ok(WsMessage::Text(text))) => {
                    let reply: AdminEnvelope<AdminResponse> = serde_json::from_str(text.as_str())?;
                    if reply.id == id {
                        return Ok(reply.body);
                    }
                }
                Some(Ok(WsMessage::Close(_))) | None => return Err(AdminClientError::Closed),
                Some(Ok(_)) => {}
                Some(Err(e)) => return Err(e.into()),
            }
        }
    }

    /// Publish into `topic`. An unknown topic comes back as `Rejected`.
    pub async fn publish(
        &mut self,
        topic: &str,
        message_id: &str,
        source: &str,
        payload: impl Into<Vec<u8>>,
    ) -> Result<(), AdminClientError> {
        let request = AdminRequest::Publish {
            topic: topic.to_string(),
            message_id: message_id.to_string(),
            source: source.to_string(),
            payload: payload.into(),
        };
        match self.call(request).await? {
            AdminResponse::Published { ok: true, .. } => Ok(()),
            AdminResponse::Published { ok: false, error } => Err(AdminClientError::Rejected(
                error.unwrap_or_else(|| "publish rejected".to_string()),
            )),
            other => Err(unexpected(other)),
        }
    }

    pub async fn subscribe_topic(&mut self, ip: &str, topics: &[String]) -> Result<(), AdminClientError> {
        let request = AdminRequest::SubscribeTopic {
            ip: ip.to_string(),
            topics: topics.to_vec(),
        };
        match self.call(request).await? {
            AdminResponse::Subscribed {} => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn unsubscribe_topic(&mut self, ip: &str, topics: &[String]) -> Result<(), AdminClientError> {
        let request = AdminRequest::UnSubscribeTopic {
            ip: ip.to_string(),
            topics: topics.to_vec(),
        };
        match self.call(request).await? {
            AdminResponse::Unsubscribed {} => Ok(()),
            other => Err(unexpected(other)),
        }
    }

    pub async fn get_connect_num(&mut self, topic: &str) -> Result<u64, AdminClientError> {
        let request = AdminRequest::GetConnectNum {
            topic: topic.to_string(),
        };
        match self.call(request).await? {
            AdminResponse::ConnectNum { number } => Ok(number),
            other => Err(unexpected(other)),
        }
    }

    pub async fn close(mut self) -> Result<(), AdminClientError> {
        self.ws.close(None).await?;
        Ok(())
    }
}

fn unexpected(response: AdminResponse) -> AdminClientError {
    match response {
        AdminResponse::Error { message } => AdminClientError::Rejected(message),
        other => AdminClientError::UnexpectedResponse(format!("{other:?}")),
    }
}
