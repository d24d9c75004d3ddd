use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use kycsync_contract::DEFAULT_MAX_ATTEMPTS;
use kycsync_queue::QueueConfig;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub storage: StorageSection,
    pub queue: QueueSection,
    pub delivery: DeliverySection,
    pub connectivity: ConnectivitySection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub sqlite_path: String,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            sqlite_path: "data/kycsync.sqlite".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct QueueSection {
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
    pub delivery_timeout_ms: u64,
    pub flush_interval_secs: u64,
}

impl Default for QueueSection {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base_ms: 1_000,
            backoff_cap_ms: 5_000,
            delivery_timeout_ms: 10_000,
            flush_interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySection {
    pub accept: bool,
}

impl Default for DeliverySection {
    fn default() -> Self {
        Self { accept: true }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ConnectivitySection {
    pub online: bool,
}

impl Default for ConnectivitySection {
    fn default() -> Self {
        Self { online: true }
    }
}

impl RuntimeConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let source = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::parse(&source).with_context(|| format!("invalid config TOML at {}", path.display()))
    }

    pub fn parse(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Background flush-on-record only makes sense for the long-running worker.
    pub fn queue_config(&self, flush_on_record: bool) -> QueueConfig {
        QueueConfig {
            max_attempts: self.queue.max_attempts.max(1),
            backoff_base: Duration::from_millis(self.queue.backoff_base_ms),
            backoff_cap: Duration::from_millis(self.queue.backoff_cap_ms),
            delivery_timeout: Duration::from_millis(self.queue.delivery_timeout_ms),
            flush_on_record,
        }
    }

    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.queue.flush_interval_secs.max(1))
    }
}
