//! Topic mapping and offset resolution

use crate::{Error, Result, TOPIC_PREFIX};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;

/// Overrides the broker topic for a device/circuit pair and adds a
/// calibration offset to every value read from it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MappingEntry {
    pub device: String,
    #[serde(deserialize_with = "scalar_string")]
    pub circuit: String,
    pub topic: String,
    #[serde(default)]
    pub offset: f64,
}

/// Accept `circuit: 1` as well as `circuit: "1"`
fn scalar_string<'de, D: Deserializer<'de>>(deserializer: D) -> std::result::Result<String, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Text(String),
        Integer(u64),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Text(s) => s,
        Scalar::Integer(n) => n.to_string(),
    })
}

impl MappingEntry {
    pub fn new(device: &str, circuit: &str, topic: &str) -> Self {
        Self {
            device: device.to_string(),
            circuit: circuit.to_string(),
            topic: topic.to_string(),
            offset: 0.0,
        }
    }

    pub fn with_offset(mut self, offset: f64) -> Self {
        self.offset = offset;
        self
    }

    fn matches(&self, device: &str, circuit: &str) -> bool {
        self.device == device && self.circuit == circuit
    }
}

/// Topic used when no mapping entry exists for a device/circuit pair
pub fn default_topic(device: &str, circuit: &str) -> String {
    format!("{}/{}/{}/value", TOPIC_PREFIX, device, circuit)
}

fn check_unique(mappings: &[MappingEntry]) -> Result<()> {
    let mut pairs = HashSet::new();
    let mut topics = HashSet::new();

    for m in mappings {
        if !pairs.insert((m.device.as_str(), m.circuit.as_str())) {
            return Err(Error::DuplicateMapping {
                device: m.device.clone(),
                circuit: m.circuit.clone(),
            });
        }
        if !topics.insert(m.topic.as_str()) {
            return Err(Error::DuplicateTopic(m.topic.clone()));
        }
    }

    Ok(())
}

/// Read-only collection of mapping entries, built once at startup
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    mappings: Vec<MappingEntry>,
}

impl MappingTable {
    /// Build a table, rejecting entries that would shadow one another.
    ///
    /// A second entry for the same device/circuit pair would never be
    /// consulted by [`resolve_topic`](Self::resolve_topic), and a second entry
    /// with the same topic would never be consulted by
    /// [`resolve_offset`](Self::resolve_offset).
    pub fn new(mappings: Vec<MappingEntry>) -> Result<Self> {
        check_unique(&mappings)?;
        Ok(Self { mappings })
    }

    pub fn len(&self) -> usize {
        self.mappings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappingEntry> {
        self.mappings.iter()
    }

    /// Topic for a device/circuit pair: the mapped topic, or
    /// `evok/{device}/{circuit}/value`
    pub fn resolve_topic(&self, device: &str, circuit: &str) -> String {
        self.mappings
            .iter()
            .find(|m| m.matches(device, circuit))
            .map(|m| m.topic.clone())
            .unwrap_or_else(|| default_topic(device, circuit))
    }

    /// Offset configured for the entry publishing to `topic`, or 0.0
    pub fn resolve_offset(&self, topic: &str) -> f64 {
        self.mappings
            .iter()
            .find(|m| m.topic == topic)
            .map(|m| m.offset)
            .unwrap_or(0.0)
    }
}
