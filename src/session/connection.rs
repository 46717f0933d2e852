//! Connection session
//!
//! A `Session` owns one accepted transport and runs three loops for it:
//!
//! - receive: read bytes, reassemble frames, queue client publishes
//! - send: drain the queue and fan each publish out through the broker
//! - heartbeat: write a heartbeat frame on a fixed interval
//!
//! Lifecycle is `Open -> Closing -> Closed`. The state lives in a `watch`
//! channel that doubles as the loops' stop signal. Any loop, the delivery
//! engine, or an external caller may call `close()`; only the first call
//! performs the teardown.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{Mutex, mpsc, watch};
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::broker::message::Message;
use crate::broker::topic::SubscriberId;
use crate::broker::Broker;
use crate::transport::codec;
use crate::utils::error::{BrokerError, SessionError};

pub type SessionReader = Box<dyn AsyncRead + Send + Unpin>;
pub type SessionWriter = Box<dyn AsyncWrite + Send + Unpin>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Open,
    Closing,
    Closed,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Capacity of the outbound queue; a full queue blocks the receive loop.
    pub queue_capacity: usize,
    pub heartbeat_interval: Duration,
    /// `None` lets a write block for as long as the peer keeps its window shut.
    pub write_timeout: Option<Duration>,
    /// Size of the scratch buffer for a single read.
    pub read_buffer_size: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            heartbeat_interval: Duration::from_secs(60),
            write_timeout: Some(Duration::from_secs(30)),
            read_buffer_size: 16 * 1024,
        }
    }
}

pub struct Session {
    identity: SubscriberId,
    writer: Mutex<SessionWriter>,
    state: watch::Sender<SessionState>,
    broker: Broker,
    options: SessionOptions,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("identity", &self.identity)
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Wrap a transport's write side. No loop runs until `start` is called.
    pub fn new(
        identity: impl Into<SubscriberId>,
        writer: SessionWriter,
        broker: Broker,
        options: SessionOptions,
    ) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState::Open);
        Arc::new(Self {
            identity: identity.into(),
            writer: Mutex::new(writer),
            state,
            broker,
            options,
        })
    }

    pub fn identity(&self) -> &str {
        &self.identity
    }

    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Spawn the receive, send and heartbeat loops.
    pub fn start(self: &Arc<Self>, reader: SessionReader) {
        let (queue_tx, queue_rx) = mpsc::channel(self.options.queue_capacity.max(1));
        tokio::spawn(Arc::clone(self).receive_loop(reader, queue_tx));
        tokio::spawn(Arc::clone(self).send_loop(queue_rx));
        tokio::spawn(Arc::clone(self).heartbeat_loop());
    }

    /// Write one encoded frame to this session's transport.
    ///
    /// Writers are serialized on the session's write lock. The lock is
    /// released before returning, so a caller may `close()` on error.
    pub async fn write_frame(&self, frame: &[u8]) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        if !self.is_open() {
            return Err(SessionError::Closed);
        }

        let write = async {
            writer.write_all(frame).await?;
            writer.flush().await
        };

        match self.options.write_timeout {
            Some(limit) => match time::timeout(limit, write).await {
                Ok(result) => result.map_err(SessionError::from),
                Err(_) => Err(SessionError::WriteTimeout(limit)),
            },
            None => write.await.map_err(SessionError::from),
        }
    }

    /// Tear the session down: stop the loops, shut the transport and drop
    /// this connection from both registries.
    ///
    /// Returns `true` for the single caller that performed the teardown.
    pub async fn close(&self) -> bool {
        let won = self.state.send_if_modified(|state| {
            if *state == SessionState::Open {
                *state = SessionState::Closing;
                true
            } else {
                false
            }
        });
        if !won {
            return false;
        }

        {
            let mut writer = self.writer.lock().await;
            if let Err(e) = writer.shutdown().await {
                debug!(connection = %self.identity, error = %e, "transport shutdown failed");
            }
        }

        self.broker.topics().remove_connection(&self.identity);
        self.broker.connections().release(self);
        self.state.send_replace(SessionState::Closed);

        info!(connection = %self.identity, "connection closed");
        true
    }

    /// Resolves once teardown has finished.
    pub async fn closed(&self) {
        let mut state = self.state.subscribe();
        let _ = state.wait_for(|s| *s == SessionState::Closed).await;
    }

    async fn receive_loop(self: Arc<Self>, mut reader: SessionReader, queue: mpsc::Sender<Message>) {
        let mut stop = self.state.subscribe();
        let mut chunk = vec![0u8; self.options.read_buffer_size.max(1)];
        let mut overflow = BytesMut::new();

        'read: loop {
            let read = tokio::select! {
                _ = stop.wait_for(|s| *s != SessionState::Open) => break,
                read = reader.read(&mut chunk) => read,
            };

            match read {
                Ok(0) => {
                    debug!(connection = %self.identity, "peer closed the stream");
                    break;
                }
                Ok(n) => overflow.extend_from_slice(&chunk[..n]),
                Err(e) => {
                    debug!(connection = %self.identity, error = %e, "read failed");
                    break;
                }
            }

            loop {
                match codec::decode(&mut overflow) {
                    Ok(Some(message)) if message.is_heartbeat() => {
                        trace!(connection = %self.identity, "ignoring inbound heartbeat");
                    }
                    Ok(Some(message)) => {
                        // blocks while the queue is full
                        if queue.send(message).await.is_err() {
                            break 'read;
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(connection = %self.identity, error = %e, "frame decode error");
                    }
                }
            }
        }

        self.close().await;
    }

    async fn send_loop(self: Arc<Self>, mut queue: mpsc::Receiver<Message>) {
        let mut stop = self.state.subscribe();

        loop {
            let message = tokio::select! {
                biased;
                _ = stop.wait_for(|s| *s != SessionState::Open) => break,
                message = queue.recv() => match message {
                    Some(message) => message,
                    None => break,
                },
            };

            match self.broker.deliver(&message).await {
                Ok(_) => {}
                Err(BrokerError::TopicNotFound(topic)) => {
                    debug!(connection = %self.identity, %topic, "no subscribers registered, dropping publish");
                }
                Err(e) => {
                    warn!(connection = %self.identity, error = %e, "publish dropped");
                }
            }
        }
    }

    async fn heartbeat_loop(self: Arc<Self>) {
        let mut stop = self.state.subscribe();
        let period = self.options.heartbeat_interval.max(Duration::from_millis(1));
        let mut ticker = time::interval_at(Instant::now() + period, period);
        // a write that blocked past several periods yields one heartbeat, not a burst
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let frame = match codec::encode_to_bytes(&Message::heartbeat()) {
            Ok(frame) => frame,
            Err(e) => {
                error!(error = %e, "failed to encode heartbeat");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = stop.wait_for(|s| *s != SessionState::Open) => return,
                _ = ticker.tick() => {}
            }

            if let Err(e) = self.write_frame(&frame).await {
                debug!(connection = %self.identity, error = %e, "heartbeat failed");
                self.close().await;
                return;
            }
        }
    }
}
