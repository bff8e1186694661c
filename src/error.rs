use std::time::Duration;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SqlPoolError {
    #[error("Failed to open connection: {0}")]
    OpenError(String),

    #[error("Failed to close connection: {0}")]
    CloseError(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Pool closed: {0}")]
    PoolClosed(String),

    #[error("Timed out waiting for a connection after {0:?}")]
    AcquireTimeout(Duration),

    #[error(transparent)]
    JsonError(#[from] serde_json::Error),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error("Other pool error: {0}")]
    Other(String),
}
