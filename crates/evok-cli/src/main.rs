//! evok-mqtt-bridge - bridge between an MQTT broker and the EVOK gateway
//!
//! Publishes gateway readings as retained MQTT topics and forwards
//! `evok/{device}/{circuit}/set` messages to the gateway.

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use evok_bridge::http::{RestSnapshot, RestSnapshotConfig};
use evok_bridge::mqtt::{self, MqttBridgeConfig};
use evok_bridge::websocket::{self, GatewayClientConfig};
use evok_bridge::{Coordinator, CoordinatorConfig, Inbound, SinkConfig, Sinks};
use evok_core::Config;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Bridge between an MQTT broker and the EVOK device gateway
#[derive(Parser, Debug)]
#[command(name = "evok-mqtt-bridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// The full url of the MQTT server to connect to, e.g. tcp://127.0.0.1:1883
    #[arg(long, env = "EVOK_MQTT_BROKER", default_value = "tcp://127.0.0.1:1883")]
    broker: String,

    /// Client ID for the MQTT connection
    #[arg(long, alias = "clientid", env = "EVOK_MQTT_CLIENT_ID", default_value = "evok")]
    client_id: String,

    /// Configuration file with MQTT topic mappings
    #[arg(short, long, env = "EVOK_MQTT_CONFIG", default_value = "/config.yaml")]
    config: PathBuf,

    /// Address and port of the EVOK API, e.g. 127.0.0.1:8080
    #[arg(long, env = "EVOK_ADDRESS", default_value = "127.0.0.1:8080")]
    evok: String,

    /// MQTT keep alive interval in seconds
    #[arg(long, env = "EVOK_MQTT_KEEP_ALIVE", default_value = "2")]
    keep_alive: u16,

    /// Deadline in seconds for each publish, gateway write and snapshot fetch
    #[arg(
        long,
        env = "EVOK_MQTT_TIMEOUT",
        default_value = "5",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: u64,

    /// Pause in seconds between reconnection attempts
    #[arg(long, env = "EVOK_MQTT_RECONNECT_DELAY", default_value = "5")]
    reconnect_delay: u64,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "EVOK_MQTT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,
}

impl Cli {
    fn mqtt_config(&self) -> Result<MqttBridgeConfig> {
        let config = MqttBridgeConfig {
            client_id: self.client_id.clone(),
            keep_alive_secs: self.keep_alive,
            reconnect_delay_secs: self.reconnect_delay,
            ..Default::default()
        };
        config
            .with_broker_url(&self.broker)
            .with_context(|| format!("Invalid broker address '{}'", self.broker))
    }

    fn gateway_config(&self) -> GatewayClientConfig {
        GatewayClientConfig {
            url: format!("ws://{}{}", self.evok, evok_core::WS_PATH),
            reconnect_delay_secs: self.reconnect_delay,
            ..Default::default()
        }
    }

    fn snapshot_config(&self) -> RestSnapshotConfig {
        RestSnapshotConfig {
            base_url: format!("http://{}", self.evok),
            timeout_secs: self.timeout,
        }
    }

    fn coordinator_config(&self, config: &Config) -> CoordinatorConfig {
        CoordinatorConfig {
            poll_interval: config.poll_interval(),
            sink: SinkConfig {
                deadline: Duration::from_secs(self.timeout),
                ..Default::default()
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(&cli.log_level, cli.json_logs)?;

    let config = Config::load(&cli.config)
        .with_context(|| format!("File reading error: {}", cli.config.display()))?;
    let table = config
        .mapping_table()
        .context("Invalid topic mappings")?;

    println!(
        "{} Bridging {} <-> {}",
        "EVOK".cyan().bold(),
        cli.broker.green(),
        cli.evok.green()
    );

    let mqtt = mqtt::connect(cli.mqtt_config()?)
        .await
        .context("Couldn't connect to MQTT broker")?;
    let gateway = websocket::connect(cli.gateway_config())
        .await
        .context("Couldn't connect to EVOK")?;
    let snapshot =
        RestSnapshot::new(cli.snapshot_config()).context("Couldn't set up EVOK REST client")?;
    info!("Polling {} every {:?}", snapshot.url(), config.poll_interval());

    // Handle Ctrl+C
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received shutdown signal"),
            Err(e) => error!("Failed to listen for ctrl+c, shutting down: {}", e),
        }
        let _ = shutdown_tx.send(());
    });

    let publisher = mqtt.publisher.clone();
    let sender = gateway.sender.clone();
    let coordinator = Coordinator::new(table, cli.coordinator_config(&config));
    let stats = coordinator
        .run(
            Sinks {
                publisher: Arc::new(mqtt.publisher),
                transport: Arc::new(gateway.sender),
                snapshot: Arc::new(snapshot),
            },
            Inbound {
                broker_commands: mqtt.commands,
                gateway_frames: gateway.frames,
            },
            shutdown_rx,
        )
        .await;

    if let Err(e) = publisher.disconnect().await {
        warn!("{}", e);
    }
    sender.close().await;

    let grace = Duration::from_secs(cli.timeout);
    await_client("MQTT", mqtt.task, grace).await;
    await_client("EVOK", gateway.task, grace).await;

    info!(
        "Published {} readings ({} failed, {} timed out), sent {} commands, ran {} polls",
        stats.broker.delivered,
        stats.broker.failed,
        stats.broker.timed_out,
        stats.gateway.delivered,
        stats.polls
    );
    println!("{}", "Bridge stopped".yellow());
    Ok(())
}

async fn await_client(name: &str, task: JoinHandle<()>, grace: Duration) {
    match tokio::time::timeout(grace, task).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => error!("{} client task failed: {}", name, e),
        Err(_) => warn!("{} client did not stop within {:?}", name, grace),
    }
}

fn setup_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .context("Failed to parse log level")?;

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(false).compact())
            .init();
    }

    Ok(())
}
