//! MQTT side of the bridge
//!
//! Connects to the broker via rumqttc, subscribes to the `set` topics and
//! forwards every matching message as a [`BrokerCommand`]. The returned
//! [`MqttPublisher`] implements [`BrokerPublisher`] for the broker writer.

use crate::{BridgeError, BrokerPublisher, Result};
use async_trait::async_trait;
use evok_core::{BrokerCommand, Publication, SET_SUBSCRIPTION};
use parking_lot::Mutex;
use rumqttc::{
    AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Outgoing, Packet,
    QoS as MqttQoS,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// MQTT connection configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MqttBridgeConfig {
    /// Broker host name or address
    pub broker_host: String,
    /// Broker port
    pub broker_port: u16,
    /// Client ID for the MQTT connection
    pub client_id: String,
    /// Topic filter for gateway commands
    #[serde(default = "default_subscribe_topic")]
    pub subscribe_topic: String,
    /// Keep alive interval in seconds
    #[serde(default = "default_keep_alive")]
    pub keep_alive_secs: u16,
    /// How long the initial connection may take
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,
    /// Pause between reconnection attempts
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
    /// Capacity of the client request queue and the inbound command queue
    #[serde(default = "default_capacity")]
    pub channel_capacity: usize,
}

fn default_subscribe_topic() -> String {
    SET_SUBSCRIPTION.to_string()
}

fn default_keep_alive() -> u16 {
    2
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_reconnect_delay() -> u64 {
    5
}

fn default_capacity() -> usize {
    100
}

impl Default for MqttBridgeConfig {
    fn default() -> Self {
        Self {
            broker_host: "127.0.0.1".to_string(),
            broker_port: 1883,
            client_id: "evok".to_string(),
            subscribe_topic: default_subscribe_topic(),
            keep_alive_secs: default_keep_alive(),
            connect_timeout_secs: default_connect_timeout(),
            reconnect_delay_secs: default_reconnect_delay(),
            channel_capacity: default_capacity(),
        }
    }
}

impl MqttBridgeConfig {
    /// Fill host and port from a broker URL such as `tcp://127.0.0.1:1883`.
    /// The scheme and the port are optional.
    pub fn with_broker_url(mut self, url: &str) -> Result<Self> {
        let (host, port) = parse_broker_url(url)?;
        self.broker_host = host;
        self.broker_port = port;
        Ok(self)
    }
}

fn parse_broker_url(url: &str) -> Result<(String, u16)> {
    let rest = match url.split_once("://") {
        Some(("tcp" | "mqtt", rest)) => rest,
        Some((scheme, _)) => {
            return Err(BridgeError::InvalidAddress(format!(
                "unsupported broker scheme '{}' in {}",
                scheme, url
            )))
        }
        None => url,
    };
    let rest = rest.trim_end_matches('/');

    let (host, port) = match rest.rsplit_once(':') {
        Some((host, port)) => {
            let port = port
                .parse::<u16>()
                .map_err(|_| BridgeError::InvalidAddress(format!("invalid port in {}", url)))?;
            (host, port)
        }
        None => (rest, 1883),
    };

    if host.is_empty() {
        return Err(BridgeError::InvalidAddress(format!("missing host in {}", url)));
    }
    Ok((host.to_string(), port))
}

/// Publishing half of the MQTT connection
#[derive(Clone)]
pub struct MqttPublisher {
    client: AsyncClient,
    connected: Arc<Mutex<bool>>,
}

impl MqttPublisher {
    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    /// Send DISCONNECT; the event loop task exits once it has gone out
    pub async fn disconnect(&self) -> Result<()> {
        self.client
            .disconnect()
            .await
            .map_err(|e| BridgeError::Publish(format!("MQTT disconnect failed: {}", e)))
    }
}

#[async_trait]
impl BrokerPublisher for MqttPublisher {
    async fn publish(&self, publication: Publication) -> Result<()> {
        self.client
            .publish(
                &publication.topic,
                MqttQoS::AtMostOnce,
                publication.retain,
                publication.payload,
            )
            .await
            .map_err(|e| BridgeError::Publish(format!("MQTT publish failed: {}", e)))
    }
}

/// A live broker connection
pub struct MqttConnection {
    pub publisher: MqttPublisher,
    pub commands: mpsc::Receiver<BrokerCommand>,
    pub task: JoinHandle<()>,
}

/// Connect to the broker and subscribe to the command topics.
///
/// Fails if the broker does not accept the connection within
/// `connect_timeout_secs`; later connection losses are retried by the
/// background event loop.
pub async fn connect(config: MqttBridgeConfig) -> Result<MqttConnection> {
    let mut options = MqttOptions::new(
        &config.client_id,
        &config.broker_host,
        config.broker_port,
    );
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs.max(1) as u64));

    let (client, mut eventloop) = AsyncClient::new(options, config.channel_capacity.max(1));

    info!(
        "MQTT connecting to {}:{} as {}",
        config.broker_host, config.broker_port, config.client_id
    );

    let connect_timeout = Duration::from_secs(config.connect_timeout_secs);
    tokio::time::timeout(connect_timeout, wait_for_connack(&mut eventloop))
        .await
        .map_err(|_| {
            BridgeError::ConnectionFailed(format!(
                "no CONNACK from {}:{} within {:?}",
                config.broker_host, config.broker_port, connect_timeout
            ))
        })??;

    subscribe(&client, &config.subscribe_topic)?;
    info!(
        "Connected to {}:{} as {} and listening on {}",
        config.broker_host, config.broker_port, config.client_id, config.subscribe_topic
    );

    let connected = Arc::new(Mutex::new(true));
    let (tx, rx) = mpsc::channel(config.channel_capacity.max(1));

    let task = tokio::spawn(run_event_loop(
        eventloop,
        client.clone(),
        config.subscribe_topic.clone(),
        Duration::from_secs(config.reconnect_delay_secs),
        tx,
        connected.clone(),
    ));

    Ok(MqttConnection {
        publisher: MqttPublisher { client, connected },
        commands: rx,
        task,
    })
}

async fn wait_for_connack(eventloop: &mut EventLoop) -> Result<()> {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    return Ok(());
                }
                return Err(BridgeError::ConnectionFailed(format!(
                    "broker refused connection: {:?}",
                    ack.code
                )));
            }
            Ok(_) => {}
            Err(e) => return Err(BridgeError::ConnectionFailed(e.to_string())),
        }
    }
}

fn subscribe(client: &AsyncClient, topic: &str) -> Result<()> {
    client
        .try_subscribe(topic, MqttQoS::AtMostOnce)
        .map_err(|e| BridgeError::ConnectionFailed(format!("Subscribe failed: {}", e)))?;
    debug!("MQTT subscribed to: {}", topic);
    Ok(())
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    topic: String,
    reconnect_delay: Duration,
    tx: mpsc::Sender<BrokerCommand>,
    connected: Arc<Mutex<bool>>,
) {
    loop {
        match eventloop.poll().await {
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                debug!(
                    "MQTT received: {} ({} bytes)",
                    publish.topic,
                    publish.payload.len()
                );
                // never block here: this loop also drives keep-alives and
                // outgoing publishes
                match tx.try_send(BrokerCommand::new(publish.topic, publish.payload)) {
                    Ok(()) => {}
                    Err(TrySendError::Full(cmd)) => {
                        warn!("Command queue full, dropping MQTT message on {}", cmd.topic)
                    }
                    Err(TrySendError::Closed(_)) => {
                        debug!("Command router gone, dropping MQTT message")
                    }
                }
            }
            Ok(Event::Incoming(Packet::ConnAck(_))) => {
                info!("MQTT reconnected to broker");
                *connected.lock() = true;
                if let Err(e) = subscribe(&client, &topic) {
                    error!("{}", e);
                }
            }
            Ok(Event::Incoming(Packet::Disconnect)) => {
                warn!("MQTT disconnected by broker");
                *connected.lock() = false;
            }
            Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                info!("MQTT disconnected");
                break;
            }
            Ok(_) => {}
            Err(e) => {
                if *connected.lock() {
                    error!("MQTT connection lost: {}", e);
                } else {
                    debug!("MQTT reconnect failed: {}", e);
                }
                *connected.lock() = false;
                tokio::time::sleep(reconnect_delay).await;
            }
        }
    }

    *connected.lock() = false;
}
