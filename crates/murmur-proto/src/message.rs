//! Chat message types.

use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::{Address, Topic};

/// What a message is: plain text, a threaded reply, or a reaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Thread,
    Reaction,
}

/// Opaque message identifier. Caller-supplied or generated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub String);

impl MessageId {
    /// Generate a fresh random identifier (16 bytes, hex-encoded).
    pub fn random() -> Self {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(hex::encode(bytes))
    }

    /// View as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A signed chat message, immutable once signed.
///
/// `index` is the position in the sender's own feed. It is assigned by the
/// sender alone and increases monotonically, so ordering within one
/// sender's messages needs no coordination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub kind: MessageKind,
    /// Target message for threads and reactions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_id: Option<MessageId>,
    pub text: String,
    pub address: Address,
    pub username: String,
    /// Sender wall-clock time, Unix milliseconds. Unauthenticated.
    pub timestamp: u64,
    /// Position in the sender's feed.
    pub index: u64,
    pub chat_topic: Topic,
    pub user_topic: Topic,
    /// Raw ed25519 verifying key of the sender.
    #[serde(with = "crate::hexser::var")]
    pub public_key: Vec<u8>,
    /// Signature over [`Message::signable_bytes`].
    #[serde(with = "crate::hexser::var")]
    pub signature: Vec<u8>,
}

impl Message {
    /// Canonical bytes covered by the signature (everything but the
    /// signature itself).
    pub fn signable_bytes(&self) -> Vec<u8> {
        let view = serde_json::json!({
            "id": self.id,
            "kind": self.kind,
            "target_id": self.target_id,
            "text": self.text,
            "address": self.address,
            "username": self.username,
            "timestamp": self.timestamp,
            "index": self.index,
            "chat_topic": self.chat_topic,
            "user_topic": self.user_topic,
            "public_key": hex::encode(&self.public_key),
        });
        serde_json::to_vec(&view).unwrap()
    }
}
