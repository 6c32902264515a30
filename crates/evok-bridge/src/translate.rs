//! Gateway <-> broker message translation
//!
//! Both translators are pure: they turn one inbound event into the frames or
//! publications it should cause, logging and dropping anything malformed.
//! Delivery is left to the sink writers.

use evok_core::codec::{self, WireReading};
use evok_core::{
    BrokerCommand, DeviceKind, GatewayCommand, GatewayReading, MappingTable, Publication,
    ReadingSource,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// Turns gateway readings into retained broker publications
#[derive(Debug, Clone)]
pub struct GatewayToBroker {
    table: Arc<MappingTable>,
}

impl GatewayToBroker {
    pub fn new(table: Arc<MappingTable>) -> Self {
        Self { table }
    }

    /// Publication for one reading: resolved topic, value plus the offset
    /// configured for that topic
    pub fn publication(&self, reading: &GatewayReading) -> Publication {
        let topic = self.table.resolve_topic(&reading.device, &reading.circuit);
        let adjusted = reading.value + self.table.resolve_offset(&topic);
        Publication::retained(topic, codec::format_value(adjusted))
    }

    /// Translate a decoded batch, keeping input order.
    ///
    /// Poll snapshots are restricted to [`DeviceKind`]s; push frames are
    /// taken as-is.
    pub fn translate(&self, entries: Vec<WireReading>, source: ReadingSource) -> Vec<Publication> {
        let mut publications = Vec::with_capacity(entries.len());

        for entry in entries {
            if source == ReadingSource::Poll && DeviceKind::from_dev(&entry.dev).is_none() {
                debug!("Ignoring device {}", entry.dev);
                continue;
            }

            match entry.into_reading() {
                Ok(reading) => publications.push(self.publication(&reading)),
                Err(e) => warn!("Skipping {} reading: {}", source, e),
            }
        }

        publications
    }

    /// Decode and translate a WebSocket push frame
    pub fn translate_frame(&self, frame: &str) -> Vec<Publication> {
        match codec::decode_push_frame(frame) {
            Ok(entries) => self.translate(entries, ReadingSource::Push),
            Err(e) => {
                warn!("Failed to decode gateway message {:?}: {}", frame, e);
                Vec::new()
            }
        }
    }

    /// Decode and translate a `/rest/all` body. An undecodable body counts as
    /// an empty snapshot.
    pub fn translate_snapshot(&self, body: &[u8]) -> Vec<Publication> {
        match codec::decode_snapshot(body) {
            Ok(entries) => self.translate(entries, ReadingSource::Poll),
            Err(e) => {
                warn!("Failed to decode gateway snapshot: {}", e);
                Vec::new()
            }
        }
    }
}

/// Turns `evok/{device}/{circuit}/set` messages into gateway command frames
#[derive(Debug, Clone, Copy, Default)]
pub struct BrokerToGateway;

impl BrokerToGateway {
    pub fn new() -> Self {
        Self
    }

    /// Build the gateway command. No offset is applied in this direction.
    pub fn command(&self, cmd: &BrokerCommand) -> evok_core::Result<GatewayCommand> {
        let (device, circuit) = codec::parse_set_topic(&cmd.topic)?;
        let value = codec::numeric_literal(&cmd.topic, &cmd.payload)?;
        Ok(GatewayCommand::set(device, circuit, value))
    }

    /// Serialized frame for a broker command, or `None` if it was dropped
    pub fn translate(&self, cmd: &BrokerCommand) -> Option<String> {
        let frame = self
            .command(cmd)
            .and_then(|command| codec::encode_command(&command));

        match frame {
            Ok(frame) => {
                debug!("Translated {} -> {}", cmd.topic, frame);
                Some(frame)
            }
            Err(e) => {
                warn!("Dropping message on topic '{}': {}", cmd.topic, e);
                None
            }
        }
    }
}
