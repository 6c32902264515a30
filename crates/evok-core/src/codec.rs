//! Gateway wire format and broker topic/payload conversions
//!
//! Gateway push frames and `/rest/all` snapshots are JSON arrays of
//! `{"dev": .., "circuit": .., "value": ..}` objects. Only `dev` is required at
//! decode time: the snapshot also lists devices (watchdogs, the board itself)
//! that carry no circuit value, and those are filtered out before
//! [`WireReading::into_reading`] is called.

use crate::{Error, GatewayCommand, GatewayReading, Result};
use serde::Deserialize;

/// `circuit` is a string in current EVOK releases but older firmware sends
/// plain integers.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
enum Circuit {
    Text(String),
    Number(serde_json::Number),
}

/// One undecoded entry of a push frame or snapshot
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WireReading {
    pub dev: String,
    #[serde(default)]
    circuit: Option<Circuit>,
    #[serde(default)]
    value: Option<serde_json::Value>,
}

impl WireReading {
    pub fn circuit(&self) -> Option<String> {
        match &self.circuit {
            Some(Circuit::Text(s)) => Some(s.clone()),
            Some(Circuit::Number(n)) => Some(n.to_string()),
            None => None,
        }
    }

    /// Extract a numeric reading. Numbers and numeric strings are accepted.
    pub fn into_reading(self) -> Result<GatewayReading> {
        let circuit = self
            .circuit()
            .ok_or_else(|| Error::DecodeError(format!("{}: missing circuit", self.dev)))?;

        let value = match &self.value {
            Some(serde_json::Value::Number(n)) => n.as_f64(),
            Some(serde_json::Value::String(s)) => {
                serde_json::from_str::<serde_json::Number>(s.trim())
                    .ok()
                    .and_then(|n| n.as_f64())
            }
            _ => None,
        };

        match value {
            Some(value) => Ok(GatewayReading {
                device: self.dev,
                circuit,
                value,
            }),
            None => Err(Error::InvalidValue {
                topic: format!("{}/{}", self.dev, circuit),
                value: self
                    .value
                    .map(|v| v.to_string())
                    .unwrap_or_else(|| "null".to_string()),
            }),
        }
    }
}

/// Decode a WebSocket push frame.
///
/// The gateway normally sends an array; a bare object is accepted as a
/// one-element batch.
pub fn decode_push_frame(text: &str) -> Result<Vec<WireReading>> {
    let json: serde_json::Value = serde_json::from_str(text)?;
    if json.is_array() {
        return Ok(serde_json::from_value(json)?);
    }
    if json.is_object() {
        return Ok(vec![serde_json::from_value(json)?]);
    }
    Err(Error::DecodeError(format!(
        "expected array or object, got {}",
        json_kind(&json)
    )))
}

/// Decode a `/rest/all` snapshot body
pub fn decode_snapshot(body: &[u8]) -> Result<Vec<WireReading>> {
    Ok(serde_json::from_slice(body)?)
}

fn json_kind(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

/// Split a `prefix/device/circuit/...` topic into device and circuit
pub fn parse_set_topic(topic: &str) -> Result<(&str, &str)> {
    let mut parts = topic.split('/');
    let _prefix = parts.next();
    match (parts.next(), parts.next()) {
        (Some(device), Some(circuit)) if !device.is_empty() && !circuit.is_empty() => {
            Ok((device, circuit))
        }
        _ => Err(Error::InvalidTopic(topic.to_string())),
    }
}

/// Interpret a broker payload as a JSON number literal, returned verbatim
/// (surrounding whitespace removed)
pub fn numeric_literal<'a>(topic: &str, payload: &'a [u8]) -> Result<&'a str> {
    let invalid = || Error::InvalidValue {
        topic: topic.to_string(),
        value: String::from_utf8_lossy(payload).into_owned(),
    };

    let text = std::str::from_utf8(payload).map_err(|_| invalid())?.trim();
    serde_json::from_str::<serde_json::Number>(text).map_err(|_| invalid())?;
    Ok(text)
}

/// Serialize a command frame for the gateway WebSocket
pub fn encode_command(command: &GatewayCommand) -> Result<String> {
    serde_json::to_string(command).map_err(|e| Error::EncodeError(e.to_string()))
}

/// Shortest form of a value, written the way the gateway's existing MQTT
/// consumers expect: `1.0` becomes `"1"`, `17.5` stays `"17.5"`, and
/// exponents below -4 or from 21 up switch to `1e-05` / `1e+21` notation.
pub fn format_value(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "+Inf" } else { "-Inf" }.to_string();
    }

    // `{:e}` gives the shortest round-trip mantissa, e.g. "1.5e-7"
    let sci = format!("{:e}", value);
    let Some((mantissa, exponent)) = sci.split_once('e') else {
        return value.to_string();
    };
    let exponent: i32 = exponent.parse().unwrap_or(0);

    if value != 0.0 && (exponent < -4 || exponent >= 21) {
        let sign = if exponent < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", mantissa, sign, exponent.abs())
    } else {
        value.to_string()
    }
}
