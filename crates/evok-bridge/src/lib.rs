//! EVOK <-> MQTT bridge
//!
//! Translates between the EVOK gateway (WebSocket push frames, `/rest/all`
//! snapshots, command frames) and MQTT topics:
//! - Gateway readings become retained publications on mapped or
//!   `evok/{device}/{circuit}/value` topics
//! - `evok/{device}/{circuit}/set` messages become gateway `set` commands

pub mod coordinator;
pub mod error;
pub mod poller;
pub mod sink;
pub mod traits;
pub mod translate;

#[cfg(feature = "mqtt")]
pub mod mqtt;

#[cfg(feature = "websocket")]
pub mod websocket;

#[cfg(feature = "http")]
pub mod http;

pub use coordinator::{BridgeStats, Coordinator, CoordinatorConfig, Inbound, Sinks};
pub use error::{BridgeError, Result};
pub use poller::Poller;
pub use sink::{BrokerHandle, GatewayHandle, SinkConfig, SinkStats};
pub use traits::{BrokerPublisher, GatewayTransport, SnapshotSource};
pub use translate::{BrokerToGateway, GatewayToBroker};

#[cfg(feature = "mqtt")]
pub use mqtt::{MqttBridgeConfig, MqttConnection, MqttPublisher};

#[cfg(feature = "websocket")]
pub use websocket::{GatewayClientConfig, GatewayConnection, GatewaySender};

#[cfg(feature = "http")]
pub use http::{RestSnapshot, RestSnapshotConfig};
