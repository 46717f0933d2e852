use std::time::Duration;

use serde::Deserialize;

use crate::session::SessionOptions;
use crate::transport::stream::StreamConfig;

/// Top-level configuration settings for the application.
///
/// Includes settings for the listeners, the broker and logging.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub broker: BrokerSettings,
    pub log: LogSettings,
}

/// Configuration settings for the listeners.
///
/// `port` is the raw stream port; `admin_port` serves the admin surface.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    pub host: String,
    pub port: u16,
    pub admin_port: u16,
}

/// Configuration settings for the broker.
#[derive(Debug, Deserialize, Clone)]
pub struct BrokerSettings {
    pub max_connections: usize,
    pub queue_capacity: usize,
    pub heartbeat_interval_secs: u64,
    /// 0 disables the write timeout.
    pub write_timeout_secs: u64,
    pub read_buffer_size: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LogSettings {
    pub level: String,
}

/// Partial configuration settings loaded from files or environment.
///
/// Allows partial specification of settings. Missing values can be filled using defaults.
#[derive(Debug, Deserialize)]
pub struct PartialSettings {
    pub server: Option<PartialServerSettings>,
    pub broker: Option<PartialBrokerSettings>,
    pub log: Option<PartialLogSettings>,
}

#[derive(Debug, Deserialize)]
pub struct PartialServerSettings {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub admin_port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct PartialBrokerSettings {
    pub max_connections: Option<usize>,
    pub queue_capacity: Option<usize>,
    pub heartbeat_interval_secs: Option<u64>,
    pub write_timeout_secs: Option<u64>,
    pub read_buffer_size: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct PartialLogSettings {
    pub level: Option<String>,
}

impl Settings {
    pub fn stream_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }

    pub fn admin_addr(&self) -> String {
        format!("{}:{}", self.server.host, self.server.admin_port)
    }

    pub fn session_options(&self) -> SessionOptions {
        let broker = &self.broker;
        SessionOptions {
            queue_capacity: broker.queue_capacity.max(1),
            heartbeat_interval: Duration::from_secs(broker.heartbeat_interval_secs.max(1)),
            write_timeout: match broker.write_timeout_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            read_buffer_size: broker.read_buffer_size.max(1),
        }
    }

    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig {
            max_connections: self.broker.max_connections,
            session: self.session_options(),
        }
    }
}

/// Provides default values for `Settings`.
impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings {
                host: "127.0.0.1".to_string(),
                port: 6666,
                admin_port: 6667,
            },
            broker: BrokerSettings {
                max_connections: 10_000,
                queue_capacity: 1024,
                heartbeat_interval_secs: 60,
                write_timeout_secs: 30,
                read_buffer_size: 16 * 1024,
            },
            log: LogSettings {
                level: "info".to_string(),
            },
        }
    }
}

impl PartialSettings {
    /// Fill every missing value from `Settings::default()`.
    pub fn merge_with_defaults(self) -> Settings {
        let default = Settings::default();
        let server = self.server;
        let broker = self.broker;
        let log = self.log;

        Settings {
            server: ServerSettings {
                host: server
                    .as_ref()
                    .and_then(|s| s.host.clone())
                    .unwrap_or(default.server.host),
                port: server
                    .as_ref()
                    .and_then(|s| s.port)
                    .unwrap_or(default.server.port),
                admin_port: server
                    .as_ref()
                    .and_then(|s| s.admin_port)
                    .unwrap_or(default.server.admin_port),
            },
            broker: BrokerSettings {
                max_connections: broker
                    .as_ref()
                    .and_then(|b| b.max_connections)
                    .unwrap_or(default.broker.max_connections),
                queue_capacity: broker
                    .as_ref()
                    .and_then(|b| b.queue_capacity)
                    .unwrap_or(default.broker.queue_capacity),
                heartbeat_interval_secs: broker
                    .as_ref()
                    .and_then(|b| b.heartbeat_interval_secs)
                    .unwrap_or(default.broker.heartbeat_interval_secs),
                write_timeout_secs: broker
                    .as_ref()
                    .and_then(|b| b.write_timeout_secs)
                    .unwrap_or(default.broker.write_timeout_secs),
                read_buffer_size: broker
                    .as_ref()
                    .and_then(|b| b.read_buffer_size)
                    .unwrap_or(default.broker.read_buffer_size),
            },
            log: LogSettings {
                level: log
                    .and_then(|l| l.level)
                    .unwrap_or(default.log.level),
            },
        }
    }
}
