//! Error types for murmur-proto.

use thiserror::Error;

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while validating untrusted payloads.
#[derive(Debug, Error)]
pub enum Error {
    /// Payload did not parse into the expected shape.
    #[error("malformed payload: {0}")]
    Malformed(#[from] serde_json::Error),

    /// A field parsed but violates a protocol constraint.
    #[error("invalid {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: String,
    },

    /// Declared address does not match the embedded public key.
    #[error("address does not match public key")]
    AddressMismatch,

    /// Signature did not verify under the embedded public key.
    #[error("signature verification failed")]
    BadSignature,
}
