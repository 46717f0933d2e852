use bytes::Bytes;
use serde_json::{Value, json};
use tokio::net::TcpListener;

use super::admin::{AdminService, serve_admin};
use super::client::AdminClient;
use super::message::{AdminEnvelope, AdminRequest, AdminResponse};
use crate::broker::Broker;
use crate::test_support::{FrameReader, attach};
use crate::utils::error::{AdminClientError, BrokerError};

fn topics(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn admin_url(broker: Broker) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(serve_admin(listener, broker));
    format!("ws://{addr}")
}

#[tokio::test]
async fn test_subscribe_publish_unsubscribe() {
    let broker = Broker::default();
    let service = AdminService::new(broker.clone());
    let (_session, client) = attach(&broker, "10.0.0.5:51000");
    let mut reader = FrameReader::new(client);

    service.subscribe_topic("10.0.0.5:51000", &topics(&["news"]));
    assert_eq!(service.get_connect_num("news"), 1);

    let report = service
        .publish("news", "m1", "backend", Bytes::from_static(b"P"))
        .await
        .unwrap();
    assert_eq!(report.delivered, 1);
    let received = reader.expect().await;
    assert_eq!(received.topic, "news");
    assert_eq!(received.payload, "P");

    service.unsubscribe_topic("10.0.0.5:51000", &topics(&["news"]));
    let result = service
        .publish("news", "m2", "backend", Bytes::from_static(b"P"))
        .await;
    assert!(matches!(result, Err(BrokerError::TopicNotFound(_))));
    assert_eq!(service.get_connect_num("news"), 0);
    assert!(!broker.topics().contains("news"));
}

#[tokio::test]
async fn test_double_subscribe_needs_double_unsubscribe() {
    let broker = Broker::default();
    let service = AdminService::new(broker.clone());
    let (_session, client) = attach(&broker, "A");
    let mut reader = FrameReader::new(client);

    service.subscribe_topic("A", &topics(&["x"]));
    service.subscribe_topic("A", &topics(&["x"]));
    assert_eq!(service.get_connect_num("x"), 2);

    // still one delivery per publish
    service.publish("x", "1", "s", Bytes::from_static(b"once")).await.unwrap();
    assert_eq!(reader.expect().await.payload, "once");
    reader.expect_silence(std::time::Duration::from_millis(50)).await;

    service.unsubscribe_topic("A", &topics(&["x"]));
    assert_eq!(service.get_connect_num("x"), 1);
    service.unsubscribe_topic("A", &topics(&["x"]));
    assert_eq!(service.get_connect_num("x"), 0);
}

#[tokio::test]
async fn test_handle_publish_unknown_topic() {
    let service = AdminService::new(Broker::default());
    let response = service
        .handle(AdminRequest::Publish {
            topic: "nobody".into(),
            message_id: "1".into(),
            source: "s".into(),
            payload: b"p".to_vec(),
        })
        .await;

    match response {
        AdminResponse::Published { ok, error } => {
            assert!(!ok);
            assert!(error.unwrap().contains("nobody"));
        }
        other => panic!("Expected Published, got {other:?}"),
    }
}

#[tokio::test]
async fn test_handle_text_echoes_id() {
    let service = AdminService::new(Broker::default());
    service.subscribe_topic("A", &topics(&["news", "sport"]));

    let reply = service
        .handle_text(r#"{"id":"7","type":"get_connect_num","topic":"news"}"#)
        .await;
    assert_eq!(reply, AdminEnvelope::new("7", AdminResponse::ConnectNum { number: 1 }));
}

#[tokio::test]
async fn test_handle_text_malformed() {
    let service = AdminService::new(Broker::default());

    for text in ["not json", r#"["get_connect_num"]"#, r#"{"id":7,"type":"reboot"}"#] {
        let reply = service.handle_text(text).await;
        assert!(reply.id.is_empty());
        assert!(
            matches!(reply.body, AdminResponse::Error { .. }),
            "Expected Error for {text}, got {:?}",
            reply.body
        );
    }
}

#[tokio::test]
async fn test_handle_text_invalid_body_keeps_id() {
    let service = AdminService::new(Broker::default());

    for (text, id) in [
        (r#"{"id":"req-42","type":"reboot"}"#, "req-42"),
        (r#"{"id":"req-43","type":"publish","topic":"news"}"#, "req-43"),
        (r#"{"type":"get_connect_num","id":"req-44"}"#, "req-44"),
    ] {
        let reply = service.handle_text(text).await;
        assert_eq!(reply.id, id);
        assert!(
            matches!(reply.body, AdminResponse::Error { .. }),
            "Expected Error for {text}, got {:?}",
            reply.body
        );
    }
}

#[test]
fn test_envelope_wire_shape() {
    let request = AdminEnvelope::new(
        "abc",
        AdminRequest::Publish {
            topic: "news".into(),
            message_id: "m1".into(),
            source: "backend".into(),
            payload: b"hello".to_vec(),
        },
    );
    let value: Value = serde_json::to_value(&request).unwrap();
    assert_eq!(
        value,
        json!({
            "id": "abc",
            "type": "publish",
            "topic": "news",
            "message_id": "m1",
            "source": "backend",
            "payload": "aGVsbG8=",
        })
    );

    let unsubscribe: AdminEnvelope<AdminRequest> = serde_json::from_value(json!({
        "type": "unsubscribe_topic",
        "ip": "1.2.3.4:5",
        "topics": ["a", "b"],
    }))
    .unwrap();
    assert_eq!(unsubscribe.id, "");
    assert_eq!(
        unsubscribe.body,
        AdminRequest::UnSubscribeTopic {
            ip: "1.2.3.4:5".into(),
            topics: topics(&["a", "b"]),
        }
    );

    let ok = serde_json::to_value(AdminResponse::Published { ok: true, error: None }).unwrap();
    assert_eq!(ok, json!({"type": "published", "ok": true}));
}

#[tokio::test]
async fn test_admin_client_over_websocket() {
    let broker = Broker::default();
    let url = admin_url(broker.clone()).await;
    let (_session, client) = attach(&broker, "A");
    let mut reader = FrameReader::new(client);

    let mut admin = AdminClient::connect(&url).await.unwrap();
    admin.subscribe_topic("A", &topics(&["news"])).await.unwrap();
    assert_eq!(admin.get_connect_num("news").await.unwrap(), 1);

    admin.publish("news", "m1", "backend", "over ws").await.unwrap();
    let received = reader.expect().await;
    assert_eq!(received.message_id, "m1");
    assert_eq!(received.source, "backend");
    assert_eq!(received.payload, "over ws");

    admin.unsubscribe_topic("A", &topics(&["news"])).await.unwrap();
    let result = admin.publish("news", "m2", "backend", "dropped").await;
    assert!(matches!(result, Err(AdminClientError::Rejected(_))));
    assert_eq!(admin.get_connect_num("news").await.unwrap(), 0);

    admin.close().await.unwrap();
}

#[tokio::test]
async fn test_admin_connection_survives_malformed_request() {
    use futures_util::{SinkExt, StreamExt};
    use tungstenite::protocol::Message as WsMessage;

    let url = admin_url(Broker::default()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    ws.send(WsMessage::text("{broken")).await.unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let reply: AdminEnvelope<AdminResponse> = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert!(matches!(reply.body, AdminResponse::Error { .. }));

    ws.send(WsMessage::text(r#"{"id":"9","type":"get_connect_num","topic":"t"}"#))
        .await
        .unwrap();
    let reply = ws.next().await.unwrap().unwrap();
    let reply: AdminEnvelope<AdminResponse> = serde_json::from_str(reply.to_text().unwrap()).unwrap();
    assert_eq!(reply, AdminEnvelope::new("9", AdminResponse::ConnectNum { number: 0 }));
}

#[tokio::test]
async fn test_admin_client_gets_rejection_for_its_own_bad_request() {
    use futures_util::{SinkExt, StreamExt};
    use tungstenite::protocol::Message as WsMessage;

    let url = admin_url(Broker::default()).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    ws.send(WsMessage::text(r#"{"id":"a","type":"get_connect_num","topic":"t"}"#))
        .await
        .unwrap();
    ws.send(WsMessage::text(r#"{"id":"b","type":"get_connect_num"}"#))
        .await
        .unwrap();

    let mut replies = Vec::new();
    for _ in 0..2 {
        let reply = ws.next().await.unwrap().unwrap();
        let reply: AdminEnvelope<AdminResponse> = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        replies.push(reply);
    }
    replies.sort_by(|x, y| x.id.cmp(&y.id));

    assert_eq!(replies[0], AdminEnvelope::new("a", AdminResponse::ConnectNum { number: 0 }));
    assert_eq!(replies[1].id, "b");
    assert!(matches!(replies[1].body, AdminResponse::Error { .. }));
}

#[tokio::test]
async fn test_pipelined_requests_beyond_in_flight_limit_all_answered() {
    use std::collections::HashSet;

    use futures_util::{SinkExt, StreamExt};
    use tungstenite::protocol::Message as WsMessage;

    use super::admin::MAX_IN_FLIGHT;

    let broker = Broker::default();
    broker.topics().subscribe("t", "A");
    let url = admin_url(broker).await;
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.unwrap();

    let total = MAX_IN_FLIGHT * 4;
    // queue every request before reading a single reply
    for i in 0..total {
        let request = AdminEnvelope::new(
            i.to_string(),
            AdminRequest::GetConnectNum { topic: "t".into() },
        );
        ws.feed(WsMessage::text(serde_json::to_string(&request).unwrap()))
            .await
            .unwrap();
    }
    ws.flush().await.unwrap();

    let mut seen = HashSet::new();
    while seen.len() < total {
        let reply = tokio::time::timeout(std::time::Duration::from_secs(5), ws.next())
            .await
            .expect("admin replies stalled")
            .unwrap()
            .unwrap();
        let reply: AdminEnvelope<AdminResponse> = serde_json::from_str(reply.to_text().unwrap()).unwrap();
        assert_eq!(reply.body, AdminResponse::ConnectNum { number: 1 });
        assert!(seen.insert(reply.id));
    }
}
