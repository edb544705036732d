//! Configuration loading
//!
//! YAML file with a top-level `connectors:` mapping of channel name to
//! channel config. Configuration errors are fatal at startup; the same
//! validation failures on a runtime reload are a client error.

mod error;

pub use error::{ConfigError, ConfigResult};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

// Sync read-back is skipped for fast channels to limit read load.
const SYNC_PATH_MIN_INTERVAL_SECS: u64 = 2;

/// One monitored channel as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Connector type identifier, e.g. `httpbus`.
    #[serde(rename = "type")]
    pub kind: String,

    /// Seconds between probe starts.
    #[serde(default = "default_interval")]
    pub interval: u64,

    /// Timeout ceiling for outstanding probes, in seconds.
    #[serde(default = "default_max_wait")]
    pub max_wait: u64,

    /// Independent async receivers that must each observe a probe.
    #[serde(default = "default_receivers")]
    pub receivers: u32,

    /// Size of the random filler payload attached to each probe event.
    #[serde(rename = "trash-size", default = "default_trash_size")]
    pub trash_size: usize,

    /// Backend base URL.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Backend topic to publish probes into.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,

    /// Verify backend TLS certificates.
    #[serde(default = "default_verify")]
    pub verify: bool,

    /// Environment variable holding this channel's bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

fn default_interval() -> u64 {
    10
}

fn default_max_wait() -> u64 {
    60
}

fn default_receivers() -> u32 {
    1
}

fn default_trash_size() -> usize {
    100
}

fn default_verify() -> bool {
    true
}

impl ChannelConfig {
    /// Clamp out-of-range values instead of rejecting them.
    pub fn normalize(&mut self) {
        self.interval = self.interval.max(1);
        self.receivers = self.receivers.max(1);
    }

    /// Whether this channel verifies delivery through the synchronous
    /// read-back path as well.
    pub fn uses_sync_path(&self) -> bool {
        self.interval >= SYNC_PATH_MIN_INTERVAL_SECS
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    connectors: BTreeMap<String, ChannelConfig>,
}

/// Load and validate the channel set from a YAML file.
pub fn load(path: &Path) -> ConfigResult<BTreeMap<String, ChannelConfig>> {
    let raw = std::fs::read_to_string(path)?;
    let file: ConfigFile = serde_yaml::from_str(&raw)?;
    if file.connectors.is_empty() {
        return Err(ConfigError::EmptyChannelSet);
    }
    let mut connectors = file.connectors;
    for config in connectors.values_mut() {
        config.normalize();
    }
    Ok(connectors)
}
