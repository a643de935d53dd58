//! Error types for murmur-net.

use thiserror::Error;

/// Result type for network operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the network collaborators.
#[derive(Debug, Error)]
pub enum Error {
    /// The addressed object or feed entry does not exist (yet).
    #[error("not found: {0}")]
    NotFound(String),

    /// Transport-level failure; retryable.
    #[error("network error: {0}")]
    Network(String),

    /// Payload could not be serialized for the wire.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check whether retrying the operation can possibly succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::Network(_))
    }
}
