use thiserror::Error;

use crate::queue::QueueBackendError;
use crate::redis::PoolError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueBackendError),

    #[error("Redis error: {0}")]
    Redis(#[from] PoolError),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_queue_error() {
        let err: AppError = QueueBackendError::InvalidLocator("..".to_string()).into();
        assert!(matches!(err, AppError::Queue(_)));
        assert_eq!(err.to_string(), "Queue error: Invalid queue locator: ..");
    }

    #[test]
    fn test_from_config_error() {
        let err: AppError = config::ConfigError::Message("bad".to_string()).into();
        assert!(err.to_string().starts_with("Configuration error"));
    }
}
