//! Active-user announcements.

use serde::{Deserialize, Serialize};

use crate::Address;

/// The most recent signed announcement observed from a peer.
///
/// Broadcast by every participant on each fetch tick. Receivers keep the
/// announcement with the latest wall-clock `timestamp` per address and
/// evict peers whose announcement has gone idle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveUser {
    pub address: Address,
    pub username: String,
    /// Sender wall-clock time, Unix milliseconds. Unauthenticated.
    pub timestamp: u64,
    /// Highest feed index the sender has written.
    pub index: u64,
    /// Raw ed25519 verifying key of the sender.
    #[serde(with = "crate::hexser::var")]
    pub public_key: Vec<u8>,
    /// Signature over [`ActiveUser::signable_bytes`].
    #[serde(with = "crate::hexser::var")]
    pub signature: Vec<u8>,
}

impl ActiveUser {
    /// Canonical bytes covered by the signature.
    pub fn signable_bytes(&self) -> Vec<u8> {
        let view = serde_json::json!({
            "address": self.address,
            "username": self.username,
            "timestamp": self.timestamp,
            "index": self.index,
            "public_key": hex::encode(&self.public_key),
        });
        serde_json::to_vec(&view).unwrap()
    }
}
