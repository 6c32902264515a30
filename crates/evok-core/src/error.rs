//! Error types for the EVOK bridge core

use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types
#[derive(Error, Debug)]
pub enum Error {
    /// Gateway frame or snapshot is not well-formed JSON of the expected shape
    #[error("decode error: {0}")]
    DecodeError(String),

    /// Gateway command could not be serialized
    #[error("encode error: {0}")]
    EncodeError(String),

    /// Broker topic does not carry a device and circuit
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// Broker payload is not a numeric literal
    #[error("invalid value {value:?} on topic {topic}")]
    InvalidValue { topic: String, value: String },

    /// Configuration file could not be read or decoded
    #[error("config error: {0}")]
    Config(String),

    /// Two mapping entries claim the same device/circuit pair
    #[error("duplicate mapping for {device}/{circuit}")]
    DuplicateMapping { device: String, circuit: String },

    /// Two mapping entries publish to the same topic
    #[error("duplicate mapping topic: {0}")]
    DuplicateTopic(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::DecodeError(e.to_string())
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(e: serde_yaml::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}
