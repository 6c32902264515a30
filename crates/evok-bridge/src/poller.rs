//! Periodic `/rest/all` synchronization
//!
//! The gateway only pushes changes, so retained topics are refreshed from a
//! full snapshot on a fixed interval. A failed fetch skips that iteration.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::sink::BrokerHandle;
use crate::translate::GatewayToBroker;
use crate::{BridgeError, Result, SnapshotSource};

pub struct Poller {
    source: Arc<dyn SnapshotSource>,
    translator: GatewayToBroker,
    broker: BrokerHandle,
    interval: Duration,
    deadline: Duration,
}

impl Poller {
    pub fn new(
        source: Arc<dyn SnapshotSource>,
        translator: GatewayToBroker,
        broker: BrokerHandle,
        interval: Duration,
        deadline: Duration,
    ) -> Self {
        Self {
            source,
            translator,
            broker,
            interval,
            deadline,
        }
    }

    /// Fetch one snapshot and queue its publications. Returns how many were
    /// queued.
    pub async fn poll_once(&self) -> Result<usize> {
        let body = tokio::time::timeout(self.deadline, self.source.fetch())
            .await
            .map_err(|_| BridgeError::Timeout(self.deadline))??;

        let publications = self.translator.translate_snapshot(&body);
        let count = publications.len();
        self.broker.submit(publications).await?;
        Ok(count)
    }

    /// Poll until shutdown is signalled. Returns the number of iterations.
    pub async fn run(self, mut shutdown: broadcast::Receiver<()>) -> u64 {
        info!("Synchronizing with gateway every {:?}", self.interval);
        let mut iterations = 0u64;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                result = self.poll_once() => {
                    iterations += 1;
                    match result {
                        Ok(count) => debug!("Snapshot queued {} publications", count),
                        Err(BridgeError::Closed(sink)) => {
                            warn!("{} closed, stopping poll loop", sink);
                            break;
                        }
                        Err(e) => warn!("Gateway snapshot failed, retrying in {:?}: {}", self.interval, e),
                    }
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        info!("Poll loop stopped after {} iterations", iterations);
        iterations
    }
}
