//! Gossip topic derivation.
//!
//! A chat room is identified by a topic hash every participant can derive
//! from the room name. Each participant additionally owns a user topic,
//! derived from the room topic and their address, under which their own
//! feed lives. Broadcast traffic within a topic is split across named
//! resources.

use serde::{Deserialize, Serialize};

use crate::Address;

/// Broadcast resource carrying active-user announcements.
pub const USERS_RESOURCE: &str = "users";

/// Broadcast resource carrying history checkpoint entries.
pub const UPDATER_RESOURCE: &str = "updater";

/// A 32-byte topic identifier (BLAKE3 hash).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(transparent)]
pub struct Topic(#[serde(with = "crate::hexser")] [u8; 32]);

impl Topic {
    /// Derive the shared topic for a chat room.
    pub fn chat(name: &str) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"chat");
        hasher.update(b":");
        hasher.update(name.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Derive the per-user feed topic within a chat.
    pub fn user(chat: &Topic, address: &Address) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(b"user");
        hasher.update(b":");
        hasher.update(chat.as_bytes());
        hasher.update(address.as_bytes());
        Self(*hasher.finalize().as_bytes())
    }

    /// Create a topic from raw bytes.
    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes.
    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Convert to hex string.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}...", &self.to_hex()[..8])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_topic_deterministic() {
        assert_eq!(Topic::chat("lobby"), Topic::chat("lobby"));
        assert_ne!(Topic::chat("lobby"), Topic::chat("other"));
    }

    #[test]
    fn user_topic_depends_on_chat_and_address() {
        let chat = Topic::chat("lobby");
        let a = Address::from_bytes([1u8; 32]);
        let b = Address::from_bytes([2u8; 32]);

        assert_eq!(Topic::user(&chat, &a), Topic::user(&chat, &a));
        assert_ne!(Topic::user(&chat, &a), Topic::user(&chat, &b));
        assert_ne!(Topic::user(&chat, &a), Topic::user(&Topic::chat("other"), &a));
    }
}
