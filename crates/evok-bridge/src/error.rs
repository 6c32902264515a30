//! Bridge error types

use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BridgeError>;

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    #[error("not connected: {0}")]
    NotConnected(String),

    #[error("publish error: {0}")]
    Publish(String),

    #[error("send error: {0}")]
    Send(String),

    #[error("fetch error: {0}")]
    Fetch(String),

    #[error("deadline of {0:?} exceeded")]
    Timeout(Duration),

    #[error("{0} channel closed")]
    Closed(&'static str),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error(transparent)]
    Core(#[from] evok_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
