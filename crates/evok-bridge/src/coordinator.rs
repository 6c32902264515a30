//! Wires the three producers to the two sink writers
//!
//! ```text
//!  broker inbound ──► BrokerToGateway ──► gateway writer ──► WebSocket
//!  gateway push   ──► GatewayToBroker ─┐
//!  poll loop      ──► GatewayToBroker ─┴► broker writer  ──► MQTT
//! ```
//!
//! Producers run as independent tasks and never share state beyond the
//! read-only mapping table and the writer queues. On shutdown the producers
//! stop first, then the writers drain whatever is already queued.

use evok_core::{BrokerCommand, MappingTable};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::poller::Poller;
use crate::sink::{
    spawn_broker_writer, spawn_gateway_writer, BrokerHandle, GatewayHandle, SinkConfig, SinkStats,
};
use crate::translate::{BrokerToGateway, GatewayToBroker};
use crate::{BrokerPublisher, GatewayTransport, SnapshotSource};

/// Coordinator settings
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorConfig {
    /// Time between gateway snapshots
    pub poll_interval: Duration,
    /// Writer queue and delivery deadline settings
    pub sink: SinkConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(10),
            sink: SinkConfig::default(),
        }
    }
}

/// Downstream collaborators, owned by the coordinator for its lifetime
pub struct Sinks {
    pub publisher: Arc<dyn BrokerPublisher>,
    pub transport: Arc<dyn GatewayTransport>,
    pub snapshot: Arc<dyn SnapshotSource>,
}

/// Inbound event streams from the protocol clients
pub struct Inbound {
    pub broker_commands: mpsc::Receiver<BrokerCommand>,
    pub gateway_frames: mpsc::Receiver<String>,
}

/// Counters reported when the coordinator stops
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BridgeStats {
    pub broker: SinkStats,
    pub gateway: SinkStats,
    pub polls: u64,
}

pub struct Coordinator {
    table: Arc<MappingTable>,
    config: CoordinatorConfig,
}

impl Coordinator {
    pub fn new(table: MappingTable, config: CoordinatorConfig) -> Self {
        Self {
            table: Arc::new(table),
            config,
        }
    }

    /// Run until `shutdown` fires (or its sender is dropped), then drain the
    /// writer queues and report what was delivered.
    pub async fn run(
        self,
        sinks: Sinks,
        inbound: Inbound,
        shutdown: broadcast::Receiver<()>,
    ) -> BridgeStats {
        let (broker, broker_writer) = spawn_broker_writer(sinks.publisher, self.config.sink);
        let (gateway, gateway_writer) = spawn_gateway_writer(sinks.transport, self.config.sink);
        let to_broker = GatewayToBroker::new(self.table.clone());

        let commands = tokio::spawn(route_broker_commands(
            BrokerToGateway::new(),
            inbound.broker_commands,
            gateway,
            shutdown.resubscribe(),
        ));
        let frames = tokio::spawn(route_gateway_frames(
            to_broker.clone(),
            inbound.gateway_frames,
            broker.clone(),
            shutdown.resubscribe(),
        ));
        let poller = Poller::new(
            sinks.snapshot,
            to_broker,
            broker,
            self.config.poll_interval,
            self.config.sink.deadline,
        );
        let polls = tokio::spawn(poller.run(shutdown));

        info!("Bridge running with {} topic mappings", self.table.len());

        let (commands, frames, polls) = tokio::join!(commands, frames, polls);
        let routed = join_or_log("broker router", commands)
            + join_or_log("gateway router", frames);
        let polls = join_or_log("poll loop", polls);
        debug!("Producers stopped after routing {} messages, draining writers", routed);

        let stats = BridgeStats {
            broker: join_or_log("broker writer", broker_writer.await),
            gateway: join_or_log("gateway writer", gateway_writer.await),
            polls,
        };
        info!("Bridge stopped: {:?}", stats);
        stats
    }
}

fn join_or_log<T: Default>(task: &str, result: Result<T, tokio::task::JoinError>) -> T {
    result.unwrap_or_else(|e| {
        error!("{} task failed: {}", task, e);
        T::default()
    })
}

/// Broker `set` messages to gateway command frames. Returns messages handled.
async fn route_broker_commands(
    translator: BrokerToGateway,
    mut rx: mpsc::Receiver<BrokerCommand>,
    gateway: GatewayHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> u64 {
    let mut handled = 0;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            cmd = rx.recv() => {
                let Some(cmd) = cmd else { break };
                handled += 1;
                info!(
                    "Received message on MQTT topic: '{}' with payload: '{}'",
                    cmd.topic,
                    String::from_utf8_lossy(&cmd.payload)
                );
                if let Some(frame) = translator.translate(&cmd) {
                    if let Err(e) = gateway.send(frame).await {
                        warn!("Stopping broker router: {}", e);
                        break;
                    }
                }
            }
        }
    }
    handled
}

/// Gateway push frames to broker publications. Returns frames handled.
async fn route_gateway_frames(
    translator: GatewayToBroker,
    mut rx: mpsc::Receiver<String>,
    broker: BrokerHandle,
    mut shutdown: broadcast::Receiver<()>,
) -> u64 {
    let mut handled = 0;
    loop {
        tokio::select! {
            biased;
            _ = shutdown.recv() => break,
            frame = rx.recv() => {
                let Some(frame) = frame else { break };
                handled += 1;
                let publications = translator.translate_frame(&frame);
                if let Err(e) = broker.submit(publications).await {
                    warn!("Stopping gateway router: {}", e);
                    break;
                }
            }
        }
    }
    handled
}
