//! Gateway REST snapshot client

use crate::{BridgeError, Result, SnapshotSource};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// REST snapshot configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RestSnapshotConfig {
    /// Base URL of the gateway, e.g. `http://127.0.0.1:8080`
    pub base_url: String,
    /// Timeout for one request in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_timeout() -> u64 {
    5
}

impl Default for RestSnapshotConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            timeout_secs: default_timeout(),
        }
    }
}

/// Fetches `GET {base_url}/rest/all`
pub struct RestSnapshot {
    client: reqwest::Client,
    url: String,
}

impl RestSnapshot {
    pub fn new(config: RestSnapshotConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BridgeError::Fetch(format!("HTTP client error: {}", e)))?;

        Ok(Self {
            client,
            url: format!(
                "{}{}",
                config.base_url.trim_end_matches('/'),
                evok_core::REST_ALL_PATH
            ),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl SnapshotSource for RestSnapshot {
    async fn fetch(&self) -> Result<Bytes> {
        let response = self
            .client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| BridgeError::Fetch(format!("Couldn't connect to EVOK: {}", e)))?;

        let status = response.status();
        debug!("HTTP GET {} -> {}", self.url, status);
        if !status.is_success() {
            return Err(BridgeError::Fetch(format!("{} returned {}", self.url, status)));
        }

        response
            .bytes()
            .await
            .map_err(|e| BridgeError::Fetch(format!("Couldn't read EVOK data: {}", e)))
    }
}
