//! Error types for murmur-session.

use murmur_proto::Address;
use thiserror::Error;

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum Error {
    /// A collaborator call failed past its retry budget.
    #[error("network error: {0}")]
    Net(#[from] murmur_net::Error),

    /// A payload failed boundary validation.
    #[error("invalid payload: {0}")]
    Proto(#[from] murmur_proto::Error),

    /// The history store failed.
    #[error("history error: {0}")]
    History(#[from] murmur_history::Error),

    /// A local payload could not be serialized.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No peer acknowledged a broadcast within the retry budget.
    #[error("broadcast not acknowledged after {retries} retries")]
    ConvergenceTimeout { retries: u32 },

    /// The session stopped while the operation was in flight.
    #[error("session stopped")]
    Cancelled,

    /// The signer does not hold the key for the configured address.
    #[error("signer address {actual} does not match configured address {expected}")]
    IdentityMismatch { expected: Address, actual: Address },

    /// The operation requires a started session.
    #[error("session not started")]
    NotStarted,
}
