//! Message types exchanged between the broker and the gateway

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Device kinds kept when translating a poll snapshot.
///
/// The snapshot lists every device the gateway knows about (watchdogs,
/// LEDs, the board itself...); only these carry values worth publishing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeviceKind {
    /// Temperature sensor (1-Wire)
    Temp,
    /// Relay output
    Relay,
    /// Analog input
    Ai,
    /// Digital input
    Input,
    /// Analog output
    Ao,
}

impl DeviceKind {
    pub const ALL: [DeviceKind; 5] = [
        DeviceKind::Temp,
        DeviceKind::Relay,
        DeviceKind::Ai,
        DeviceKind::Input,
        DeviceKind::Ao,
    ];

    /// Look up the kind for a gateway `dev` string
    pub fn from_dev(dev: &str) -> Option<Self> {
        match dev {
            "temp" => Some(DeviceKind::Temp),
            "relay" => Some(DeviceKind::Relay),
            "ai" => Some(DeviceKind::Ai),
            "input" => Some(DeviceKind::Input),
            "ao" => Some(DeviceKind::Ao),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceKind::Temp => "temp",
            DeviceKind::Relay => "relay",
            DeviceKind::Ai => "ai",
            DeviceKind::Input => "input",
            DeviceKind::Ao => "ao",
        }
    }
}

impl fmt::Display for DeviceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a batch of readings came from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadingSource {
    /// Unsolicited frame on the gateway WebSocket
    Push,
    /// Periodic `/rest/all` snapshot
    Poll,
}

impl fmt::Display for ReadingSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadingSource::Push => f.write_str("push"),
            ReadingSource::Poll => f.write_str("poll"),
        }
    }
}

/// One value reported by the gateway for a device/circuit
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayReading {
    pub device: String,
    pub circuit: String,
    pub value: f64,
}

impl GatewayReading {
    pub fn new(device: impl Into<String>, circuit: impl Into<String>, value: f64) -> Self {
        Self {
            device: device.into(),
            circuit: circuit.into(),
            value,
        }
    }
}

/// Message received on the `evok/+/+/set` subscription
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerCommand {
    pub topic: String,
    pub payload: Bytes,
}

impl BrokerCommand {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Command frame written to the gateway WebSocket
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayCommand {
    #[serde(alias = "cmd")]
    pub command: String,
    #[serde(rename = "dev")]
    pub device: String,
    pub circuit: String,
    pub value: String,
}

impl GatewayCommand {
    /// Build a `set` command
    pub fn set(
        device: impl Into<String>,
        circuit: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            command: "set".to_string(),
            device: device.into(),
            circuit: circuit.into(),
            value: value.into(),
        }
    }
}

/// A broker publish produced from a gateway reading
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Publication {
    pub topic: String,
    pub payload: String,
    pub retain: bool,
}

impl Publication {
    /// Retained publish, the only kind the bridge emits
    pub fn retained(topic: impl Into<String>, payload: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
            retain: true,
        }
    }
}
