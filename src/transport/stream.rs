//! Raw stream transport
//!
//! Accepts TCP connections, identifies each one by its remote address,
//! registers a `Session` for it and starts the session's loops.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use crate::broker::Broker;
use crate::session::{Session, SessionOptions};
use crate::utils::error::ServerError;

#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Connections beyond this many live sessions are refused.
    pub max_connections: usize,
    pub session: SessionOptions,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            max_connections: 10_000,
            session: SessionOptions::default(),
        }
    }
}

/// Bind `addr` and accept stream connections. A bind failure is returned to
/// the caller; once listening, this only returns if the listener does.
pub async fn start_stream_server(
    addr: &str,
    broker: Broker,
    config: StreamConfig,
) -> Result<(), ServerError> {
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind {
            addr: addr.to_string(),
            source,
        })?;

    info!(%addr, "tcp service listening");
    serve_stream(listener, broker, config).await;
    Ok(())
}

pub async fn serve_stream(listener: TcpListener, broker: Broker, config: StreamConfig) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => accept_connection(stream, peer, &broker, &config),
            Err(e) => {
                error!(error = %e, "tcp service accept error");
                // back off so a persistent error (e.g. out of fds) does not spin
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
    }
}

fn accept_connection(stream: TcpStream, peer: SocketAddr, broker: &Broker, config: &StreamConfig) {
    let identity = peer.to_string();

    if broker.connections().len() >= config.max_connections {
        warn!(connection = %identity, limit = config.max_connections, "connection limit reached, refusing");
        return;
    }

    if let Err(e) = stream.set_nodelay(true) {
        debug!(connection = %identity, error = %e, "failed to set TCP_NODELAY");
    }

    let (reader, writer) = stream.into_split();
    let session = Session::new(
        identity.clone(),
        Box::new(writer),
        broker.clone(),
        config.session.clone(),
    );

    if !broker.connections().put(&identity, session.clone()) {
        warn!(connection = %identity, "identity already registered, refusing");
        return;
    }

    info!(connection = %identity, "new connection");
    session.start(Box::new(reader));
}
