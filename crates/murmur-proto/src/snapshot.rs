//! History snapshot and checkpoint wire types.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Address, ObjectRef};

/// "This user had written up to this feed index as of this time."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEntry {
    pub index: u64,
    pub timestamp: u64,
}

/// Membership events recorded into history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UserEventKind {
    Joined,
    Left,
}

/// A membership event, deduplicated by `(kind, timestamp)` on merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserEvent {
    pub kind: UserEventKind,
    pub timestamp: u64,
}

/// Everything history remembers about one address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UserHistory {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub events: Vec<UserEvent>,
    #[serde(default)]
    pub message_entries: Vec<MessageEntry>,
}

/// The merged, append-accumulating view of all users' feed positions.
///
/// Grows monotonically until trimmed; trimming is lossy and intentional
/// (old history is allowed to be forgotten). A `BTreeMap` keeps
/// serialization deterministic, which merge dedup and size accounting
/// rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct HistorySnapshot {
    #[serde(default)]
    pub users: BTreeMap<Address, UserHistory>,
}

impl HistorySnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Total message entries across all users.
    pub fn total_entries(&self) -> usize {
        self.users.values().map(|u| u.message_entries.len()).sum()
    }

    /// Check if no user has any recorded state.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Serialized size in bytes, as uploaded to the storage network.
    pub fn serialized_size(&self) -> usize {
        serde_json::to_vec(self).map(|v| v.len()).unwrap_or(0)
    }
}

/// A published pointer to an uploaded [`HistorySnapshot`].
///
/// `generation` increases by exactly 1 per published checkpoint.
/// `updater` names the peer elected to publish the *next* checkpoint;
/// only that peer acts on the entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointEntry {
    pub generation: u64,
    /// Content address of the snapshot. `None` only for the bootstrap
    /// entry of a brand-new chat, where nothing has been uploaded yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reference: Option<ObjectRef>,
    pub updater: Address,
    /// Publisher wall-clock time, Unix milliseconds.
    pub timestamp: u64,
}

impl CheckpointEntry {
    /// The default entry a peer assumes when no checkpoint has ever been
    /// published for the chat.
    pub fn bootstrap(updater: Address, timestamp: u64) -> Self {
        Self {
            generation: 0,
            reference: None,
            updater,
            timestamp,
        }
    }

    /// Ordering key for candidate selection: highest generation wins,
    /// ties broken by latest timestamp.
    pub fn ordering_key(&self) -> (u64, u64) {
        (self.generation, self.timestamp)
    }

    /// Identity key for processed-tracking and buffer dedup.
    pub fn candidate_key(&self) -> (u64, Option<ObjectRef>) {
        (self.generation, self.reference)
    }

    /// Check if this entry supersedes another.
    pub fn is_newer_than(&self, other: &Self) -> bool {
        self.ordering_key() > other.ordering_key()
    }
}
