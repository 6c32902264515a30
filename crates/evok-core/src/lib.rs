//! EVOK Bridge Core
//!
//! Types, topic mapping and wire encoding shared by the EVOK <-> MQTT bridge.
//!
//! This crate provides:
//! - Message types ([`GatewayReading`], [`GatewayCommand`], [`BrokerCommand`], [`Publication`])
//! - The mapping table and topic resolver ([`MappingTable`])
//! - Gateway JSON decoding and command encoding ([`codec`])
//! - The configuration file schema ([`Config`])

pub mod codec;
pub mod config;
pub mod error;
pub mod mapping;
pub mod types;

pub use config::Config;
pub use error::{Error, Result};
pub use mapping::{default_topic, MappingEntry, MappingTable};
pub use types::*;

/// First segment of every default topic
pub const TOPIC_PREFIX: &str = "evok";

/// Broker subscription carrying commands for the gateway
pub const SET_SUBSCRIPTION: &str = "evok/+/+/set";

/// Gateway WebSocket path
pub const WS_PATH: &str = "/ws";

/// Gateway full-state REST path
pub const REST_ALL_PATH: &str = "/rest/all";
