//! Mapping configuration file
//!
//! YAML, the format existing deployments use:
//!
//! ```yaml
//! interval: 10
//! mappings:
//!   - device: temp
//!     circuit: 28FF1234
//!     topic: sensors/outdoor
//!     offset: -2.5
//! ```
//!
//! Files ending in `.toml` are read as TOML with the same schema.

use crate::{Error, MappingEntry, MappingTable, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Contents of the configuration file. Unknown keys are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Seconds between `/rest/all` polls
    pub interval: u64,
    #[serde(default)]
    pub mappings: Vec<MappingEntry>,
}

impl Config {
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let config: Config = serde_yaml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and decode a config file, picking the format from its extension
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;

        let is_toml = path
            .extension()
            .map_or(false, |ext| ext.eq_ignore_ascii_case("toml"));
        if is_toml {
            Self::from_toml_str(&text)
        } else {
            Self::from_yaml_str(&text)
        }
    }

    fn validate(&self) -> Result<()> {
        if self.interval == 0 {
            return Err(Error::Config("interval must be at least 1 second".into()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.interval)
    }

    /// Build the lookup table, failing on duplicate entries
    pub fn mapping_table(&self) -> Result<MappingTable> {
        MappingTable::new(self.mappings.clone())
    }
}
