use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::env;
use std::path::PathBuf;

use crate::queue::codec::RecordCodec;
use crate::queue::lock::DEFAULT_RETRY_INTERVAL;
use crate::queue::QueueConfig as BackendQueueConfig;

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub redis: RedisConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QueueConfig {
    /// FIFO backend: "file" or "memory"
    #[serde(default = "default_backend")]
    pub backend: String,
    /// Priority backend: "memory" or "redis"
    #[serde(default = "default_priority_backend")]
    pub priority_backend: String,
    /// Root directory of the file backend
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
    /// Separator between record fields in the file backend
    #[serde(default = "default_field_delimiter")]
    pub field_delimiter: String,
    /// Seconds a delivered message stays hidden
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_seconds: u64,
    /// Sleep between lock attempts in milliseconds
    #[serde(default = "default_lock_retry_interval")]
    pub lock_retry_interval_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    #[serde(default = "default_redis_url")]
    pub url: String,
    /// Prefix for priority queue sorted-set keys
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Filter directive used when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
    /// "pretty" or "json"
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_backend() -> String {
    "file".to_string()
}

fn default_priority_backend() -> String {
    "memory".to_string()
}

fn default_directory() -> PathBuf {
    PathBuf::from("ara-queue-data")
}

fn default_field_delimiter() -> String {
    ":".to_string()
}

fn default_visibility_timeout() -> u64 {
    30 // 30 seconds
}

fn default_lock_retry_interval() -> u64 {
    DEFAULT_RETRY_INTERVAL.as_millis() as u64
}

fn default_redis_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_key_prefix() -> String {
    "ara:pq".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        // Load .env file if exists
        let _ = dotenvy::dotenv();

        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let builder = Config::builder()
            // Load config file if exists
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{}", run_mode)).required(false))
            // ARA_QUEUE__QUEUE__BACKEND, ARA_QUEUE__REDIS__URL, etc.
            .add_source(
                Environment::with_prefix("ARA_QUEUE")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        let settings: Self = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reject values the backends cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        RecordCodec::new(self.queue.field_delimiter.as_str())
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        if self.queue.lock_retry_interval_ms == 0 {
            return Err(ConfigError::Message(
                "queue.lock_retry_interval_ms must be greater than zero".to_string(),
            ));
        }

        match self.queue.backend.as_str() {
            "file" | "memory" => {}
            other => {
                return Err(ConfigError::Message(format!("unknown queue.backend {other:?}")));
            }
        }
        match self.queue.priority_backend.as_str() {
            "memory" | "redis" => {}
            other => {
                return Err(ConfigError::Message(format!(
                    "unknown queue.priority_backend {other:?}"
                )));
            }
        }

        Ok(())
    }
}

impl QueueConfig {
    /// Backend-facing view of these settings.
    pub fn backend_config(&self) -> BackendQueueConfig {
        BackendQueueConfig {
            directory: self.directory.clone(),
            field_delimiter: self.field_delimiter.clone(),
            visibility_timeout_seconds: self.visibility_timeout_seconds,
            lock_retry_interval_ms: self.lock_retry_interval_ms,
        }
    }

    /// Whether FIFO messages live only as long as this process.
    pub fn fifo_is_process_local(&self) -> bool {
        self.backend == "memory"
    }

    /// Whether priority messages live only as long as this process.
    pub fn priority_is_process_local(&self) -> bool {
        self.priority_backend != "redis"
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            redis: RedisConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            priority_backend: default_priority_backend(),
            directory: default_directory(),
            field_delimiter: default_field_delimiter(),
            visibility_timeout_seconds: default_visibility_timeout(),
            lock_retry_interval_ms: default_lock_retry_interval(),
        }
    }
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: default_redis_url(),
            key_prefix: default_key_prefix(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}
