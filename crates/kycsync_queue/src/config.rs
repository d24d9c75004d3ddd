use std::time::Duration;

use kycsync_contract::DEFAULT_MAX_ATTEMPTS;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
    /// Deadline for one delivery call; expiry counts as a failed attempt.
    pub delivery_timeout: Duration,
    /// Spawn a background flush after every recorded artifact.
    pub flush_on_record: bool,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(5),
            delivery_timeout: Duration::from_secs(10),
            flush_on_record: true,
        }
    }
}
