//! Backend configuration

use std::path::PathBuf;
use std::time::Duration;

use super::lock::DEFAULT_RETRY_INTERVAL;

/// Configuration shared by the queue backends
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Root directory for the durable backend
    pub directory: PathBuf,
    /// Record field separator for the durable backend
    pub field_delimiter: String,
    /// How long a delivered message stays hidden before redelivery
    pub visibility_timeout_seconds: u64,
    /// Sleep between attempts to take a contended queue lock
    pub lock_retry_interval_ms: u64,
}

impl QueueConfig {
    pub fn visibility_timeout(&self) -> Duration {
        Duration::from_secs(self.visibility_timeout_seconds)
    }

    pub fn lock_retry_interval(&self) -> Duration {
        Duration::from_millis(self.lock_retry_interval_ms)
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("ara-queue-data"),
            field_delimiter: ":".to_string(),
            visibility_timeout_seconds: 30,
            lock_retry_interval_ms: DEFAULT_RETRY_INTERVAL.as_millis() as u64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_durations() {
        let config = QueueConfig::default();
        assert_eq!(config.visibility_timeout(), Duration::from_secs(30));
        assert_eq!(config.lock_retry_interval(), Duration::from_millis(50));
    }
}
