//! Murmur protocol types
//!
//! Wire-level data model for the Murmur serverless group chat: peer
//! addresses, content references, gossip topics, chat messages, active-user
//! announcements, history snapshots and checkpoint entries.
//!
//! # Trust boundary
//!
//! Everything arriving from the network is untrusted bytes. The [`validate`]
//! module is the single place where raw payloads become typed values;
//! nothing downstream of it handles unvalidated data. Payloads that fail
//! schema or signature checks are rejected there and never propagate.
//!
//! # Identity
//!
//! A peer address is the double-BLAKE3 hash of its ed25519 verifying key.
//! Signed payloads carry the verifying key alongside the signature, so a
//! receiver checks both that the key hashes to the declared address and
//! that the signature verifies under that key.

mod address;
mod error;
mod hexser;
mod message;
mod snapshot;
mod topic;
mod user;
pub mod validate;

pub use address::{Address, ObjectRef};
pub use error::{Error, Result};
pub use message::{Message, MessageId, MessageKind};
pub use snapshot::{CheckpointEntry, HistorySnapshot, MessageEntry, UserEvent, UserEventKind, UserHistory};
pub use topic::{Topic, UPDATER_RESOURCE, USERS_RESOURCE};
pub use user::ActiveUser;

use std::time::{SystemTime, UNIX_EPOCH};

/// Current wall-clock time as Unix milliseconds.
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_millis() as u64
}
