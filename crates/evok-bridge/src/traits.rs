//! Seams to the external collaborators
//!
//! The coordinator only ever talks to the broker and the gateway through
//! these traits, so the protocol clients in this crate can be swapped for
//! in-memory fakes.

use async_trait::async_trait;
use bytes::Bytes;
use evok_core::Publication;

use crate::Result;

/// Publishes to the MQTT broker
#[async_trait]
pub trait BrokerPublisher: Send + Sync {
    /// Hand one publication to the broker client. Returns once the client
    /// has accepted it locally.
    async fn publish(&self, publication: Publication) -> Result<()>;
}

/// Writes text frames to the gateway streaming connection
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn send_text(&self, frame: String) -> Result<()>;
}

/// Fetches the gateway's full-state snapshot
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    async fn fetch(&self) -> Result<Bytes>;
}
