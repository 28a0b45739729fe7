use std::io;
use thiserror::Error;

/// Error type for pool operations.
#[derive(Error, Debug)]
pub enum PoolError {
    /// The OS refused to spawn a worker or waiter thread.
    #[error("failed to spawn thread: {0}")]
    Spawn(#[source] io::Error),

    /// IO error while reading configuration.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Configuration could not be deserialized.
    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Configuration was well-formed but not usable.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),
}

/// Result type alias for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
