//! CLI for topic-manager
//!
//! Subcommands:
//! - `serve`: run the stream and admin services
//! - `publish`, `subscribe`, `unsubscribe`, `count`: call a running admin service

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use topic_manager::broker::Broker;
use topic_manager::config::{Settings, load_config, load_config_from};
use topic_manager::transport::{AdminClient, start_admin_server, start_stream_server};
use topic_manager::utils::logging;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "topic-manager", version, about = "Topic fanout manager")]
enum Command {
    /// Start the stream and admin services
    Serve {
        /// Configuration file (defaults to config/default.* if present)
        #[arg(long)]
        config: Option<PathBuf>,
        /// Override the stream listen address, e.g. 0.0.0.0:6666
        #[arg(long)]
        stream_addr: Option<String>,
        /// Override the admin listen address, e.g. 0.0.0.0:6667
        #[arg(long)]
        admin_addr: Option<String>,
    },
    /// Publish a message into a topic
    Publish {
        #[arg(long, default_value = "ws://127.0.0.1:6667")]
        url: String,
        #[arg(long)]
        topic: String,
        #[arg(long)]
        payload: String,
        #[arg(long, default_value = "cli")]
        message_id: String,
        #[arg(long, default_value = "cli")]
        source: String,
    },
    /// Subscribe a connection identity to topics
    Subscribe {
        #[arg(long, default_value = "ws://127.0.0.1:6667")]
        url: String,
        /// Connection identity (remote ip:port as seen by the manager)
        #[arg(long)]
        ip: String,
        #[arg(required = true)]
        topics: Vec<String>,
    },
    /// Unsubscribe a connection identity from topics
    Unsubscribe {
        #[arg(long, default_value = "ws://127.0.0.1:6667")]
        url: String,
        #[arg(long)]
        ip: String,
        #[arg(required = true)]
        topics: Vec<String>,
    },
    /// Print the subscriber count of a topic
    Count {
        #[arg(long, default_value = "ws://127.0.0.1:6667")]
        url: String,
        #[arg(long)]
        topic: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let result = match Command::parse() {
        Command::Serve {
            config,
            stream_addr,
            admin_addr,
        } => run_server(config, stream_addr, admin_addr).await,
        Command::Publish {
            url,
            topic,
            payload,
            message_id,
            source,
        } => run_publish(&url, &topic, &message_id, &source, payload).await,
        Command::Subscribe { url, ip, topics } => run_subscribe(&url, &ip, &topics, true).await,
        Command::Unsubscribe { url, ip, topics } => run_subscribe(&url, &ip, &topics, false).await,
        Command::Count { url, topic } => run_count(&url, &topic).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            // logging may not be installed yet (e.g. a bad config file)
            eprintln!("topic-manager: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run_server(
    config: Option<PathBuf>,
    stream_addr: Option<String>,
    admin_addr: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let settings = match config {
        Some(path) => load_config_from(path)?,
        None => load_config()?,
    };
    logging::init(&settings.log);

    let stream_addr = stream_addr.unwrap_or_else(|| settings.stream_addr());
    let admin_addr = admin_addr.unwrap_or_else(|| settings.admin_addr());
    let broker = Broker::new();

    tokio::select! {
        result = start_stream_server(&stream_addr, broker.clone(), settings.stream_config()) => {
            result?;
            error!("tcp service exited unexpectedly.");
        }
        result = start_admin_server(&admin_addr, broker.clone()) => {
            result?;
            error!("admin service exited unexpectedly.");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown signal received. Exiting gracefully.");
        }
    }

    Ok(())
}

async fn connect(url: &str) -> Result<AdminClient, Box<dyn std::error::Error>> {
    logging::init(&Settings::default().log);
    Ok(AdminClient::connect(url).await?)
}

async fn run_publish(
    url: &str,
    topic: &str,
    message_id: &str,
    source: &str,
    payload: String,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(url).await?;
    client
        .publish(topic, message_id, source, payload.into_bytes())
        .await?;
    println!("published to {topic}");
    client.close().await?;
    Ok(())
}

async fn run_subscribe(
    url: &str,
    ip: &str,
    topics: &[String],
    subscribe: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(url).await?;
    if subscribe {
        client.subscribe_topic(ip, topics).await?;
        println!("{ip} subscribed to {}", topics.join(", "));
    } else {
        client.unsubscribe_topic(ip, topics).await?;
        println!("{ip} unsubscribed from {}", topics.join(", "));
    }
    client.close().await?;
    Ok(())
}

async fn run_count(url: &str, topic: &str) -> Result<(), Box<dyn std::error::Error>> {
    let mut client = connect(url).await?;
    let number = client.get_connect_num(topic).await?;
    println!("{number}");
    client.close().await?;
    Ok(())
}
