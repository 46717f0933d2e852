use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, DuplexStream};

use crate::broker::{Broker, Message};
use crate::session::{Session, SessionOptions};
use crate::transport::codec;

pub const PIPE_CAPACITY: usize = 64 * 1024;

/// A session whose transport is an in-memory pipe; the returned stream is
/// the client's end. Registered with the broker but no loops are running.
pub fn attach(broker: &Broker, id: &str) -> (Arc<Session>, DuplexStream) {
    attach_with(broker, id, SessionOptions::default())
}

pub fn attach_with(broker: &Broker, id: &str, options: SessionOptions) -> (Arc<Session>, DuplexStream) {
    let (server_end, client_end) = tokio::io::duplex(PIPE_CAPACITY);
    let (_reader, writer) = tokio::io::split(server_end);
    let session = Session::new(id, Box::new(writer), broker.clone(), options);
    assert!(broker.connections().put(id, session.clone()));
    (session, client_end)
}

/// Like `attach_with`, but with the receive/send/heartbeat loops running.
pub fn start_with(broker: &Broker, id: &str, options: SessionOptions) -> (Arc<Session>, DuplexStream) {
    let (server_end, client_end) = tokio::io::duplex(PIPE_CAPACITY);
    let (reader, writer) = tokio::io::split(server_end);
    let session = Session::new(id, Box::new(writer), broker.clone(), options);
    assert!(broker.connections().put(id, session.clone()));
    session.start(Box::new(reader));
    (session, client_end)
}

pub fn frame(message: &Message) -> Vec<u8> {
    codec::encode_to_bytes(message).unwrap().to_vec()
}

/// Reads whole frames off a client's end of the pipe.
pub struct FrameReader {
    stream: DuplexStream,
    buf: BytesMut,
}

impl FrameReader {
    pub fn new(stream: DuplexStream) -> Self {
        Self {
            stream,
            buf: BytesMut::new(),
        }
    }

    /// Next frame, or `None` on EOF.
    pub async fn next(&mut self) -> Option<Message> {
        loop {
            if let Some(message) = codec::decode(&mut self.buf).unwrap() {
                return Some(message);
            }
            let n = self.stream.read_buf(&mut self.buf).await.unwrap();
            if n == 0 {
                return None;
            }
        }
    }

    pub async fn expect(&mut self) -> Message {
        tokio::time::timeout(Duration::from_secs(5), self.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream closed before a frame arrived")
    }

    /// Asserts nothing arrives within `wait`.
    pub async fn expect_silence(&mut self, wait: Duration) {
        if let Ok(message) = tokio::time::timeout(wait, self.next()).await {
            panic!("expected no frame, got {message:?}");
        }
    }
}

pub async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}
