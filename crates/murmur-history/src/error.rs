//! Error types for murmur-history.

use thiserror::Error;

/// Result type for history operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while maintaining chat history.
#[derive(Debug, Error)]
pub enum Error {
    /// A collaborator call failed.
    #[error("network error: {0}")]
    Net(#[from] murmur_net::Error),

    /// A downloaded payload failed boundary validation.
    #[error("invalid payload: {0}")]
    Proto(#[from] murmur_proto::Error),

    /// The local snapshot could not be serialized for upload.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
