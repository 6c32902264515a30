//! Single-writer tasks for the two downstream sinks
//!
//! Each sink (broker, gateway) is owned by exactly one task that drains a
//! bounded queue. Producers submit whole batches, so the items of one batch
//! are delivered back to back and in order, and two batches never interleave.
//! A full queue blocks the producer until the writer catches up.
//!
//! Every delivery runs under a deadline. A failed or expired delivery is
//! logged and counted; the writer moves on to the next item.

use evok_core::Publication;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{BridgeError, BrokerPublisher, GatewayTransport, Result};

/// Queue and deadline settings shared by both writers
#[derive(Debug, Clone, Copy)]
pub struct SinkConfig {
    /// Batches that may wait in the queue before producers block
    pub capacity: usize,
    /// Upper bound on a single delivery
    pub deadline: Duration,
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            deadline: Duration::from_secs(5),
        }
    }
}

/// Delivery counters returned when a writer finishes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    pub delivered: u64,
    pub failed: u64,
    pub timed_out: u64,
}

impl SinkStats {
    pub fn attempted(&self) -> u64 {
        self.delivered + self.failed + self.timed_out
    }
}

/// Producer side of the broker writer queue
#[derive(Debug, Clone)]
pub struct BrokerHandle {
    tx: mpsc::Sender<Vec<Publication>>,
}

impl BrokerHandle {
    /// Queue a batch of publications as one unit
    pub async fn submit(&self, batch: Vec<Publication>) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.tx
            .send(batch)
            .await
            .map_err(|_| BridgeError::Closed("broker writer"))
    }
}

/// Producer side of the gateway writer queue
#[derive(Debug, Clone)]
pub struct GatewayHandle {
    tx: mpsc::Sender<Vec<String>>,
}

impl GatewayHandle {
    /// Queue one command frame
    pub async fn send(&self, frame: String) -> Result<()> {
        self.tx
            .send(vec![frame])
            .await
            .map_err(|_| BridgeError::Closed("gateway writer"))
    }
}

/// Spawn the task that owns broker publishing. It exits, returning its
/// counters, once every [`BrokerHandle`] is dropped and the queue is drained.
pub fn spawn_broker_writer(
    publisher: Arc<dyn BrokerPublisher>,
    config: SinkConfig,
) -> (BrokerHandle, JoinHandle<SinkStats>) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let task = tokio::spawn(drain("broker", rx, config.deadline, move |p: Publication| {
        let publisher = publisher.clone();
        async move {
            debug!("Publishing {} = {}", p.topic, p.payload);
            publisher.publish(p).await
        }
    }));
    (BrokerHandle { tx }, task)
}

/// Spawn the task that owns writes to the gateway connection
pub fn spawn_gateway_writer(
    transport: Arc<dyn GatewayTransport>,
    config: SinkConfig,
) -> (GatewayHandle, JoinHandle<SinkStats>) {
    let (tx, rx) = mpsc::channel(config.capacity.max(1));
    let task = tokio::spawn(drain("gateway", rx, config.deadline, move |frame: String| {
        let transport = transport.clone();
        async move {
            debug!("Sending to gateway: {}", frame);
            transport.send_text(frame).await
        }
    }));
    (GatewayHandle { tx }, task)
}

async fn drain<T, F, Fut>(
    sink: &'static str,
    mut rx: mpsc::Receiver<Vec<T>>,
    deadline: Duration,
    mut deliver: F,
) -> SinkStats
where
    F: FnMut(T) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut stats = SinkStats::default();

    while let Some(batch) = rx.recv().await {
        for item in batch {
            match tokio::time::timeout(deadline, deliver(item)).await {
                Ok(Ok(())) => stats.delivered += 1,
                Ok(Err(e)) => {
                    warn!("Failed to deliver to {}: {}", sink, e);
                    stats.failed += 1;
                }
                Err(_) => {
                    warn!(
                        "Failed to deliver to {}: {}",
                        sink,
                        BridgeError::Timeout(deadline)
                    );
                    stats.timed_out += 1;
                }
            }
        }
    }

    debug!("{} writer finished: {:?}", sink, stats);
    stats
}
