//! Message fetch pipeline: read planning and index de-duplication.
//!
//! Broadcast delivery is at-least-once, so the same active-user
//! announcement (and thus the same feed index) is observed repeatedly.
//! The pipeline keeps a per-address last-read index and only plans reads
//! past it, turning duplicate announcements into no-ops instead of
//! re-fetch storms.

use std::collections::HashMap;
use std::ops::RangeInclusive;

use murmur_proto::{ActiveUser, Address, Message};

/// Outcome of resolving one feed entry.
#[derive(Debug)]
pub(crate) enum Resolution {
    /// A validated message.
    Message(Box<Message>),
    /// Permanently skipped (banned, already processed, or invalid);
    /// the read position advances past it.
    Skipped,
    /// Transient failure; retry from the same position next tick.
    Pending,
}

/// Per-address read-index cache of the fetch pipeline.
///
/// Owned exclusively by the fetch tick task; needs no lock beyond the
/// session state it lives in.
#[derive(Debug, Default)]
pub struct MessageFetchPipeline {
    last_read: HashMap<Address, u64>,
}

impl MessageFetchPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Indexes to read for an announcement, oldest first. `None` when
    /// the announced index has already been read.
    ///
    /// A peer seen for the first time is read from its announced index
    /// only; its earlier messages are reachable through history, not by
    /// replaying the whole feed.
    pub fn plan(&self, user: &ActiveUser) -> Option<RangeInclusive<u64>> {
        match self.last_read.get(&user.address) {
            Some(last) if *last >= user.index => None,
            Some(last) => Some(last + 1..=user.index),
            None => Some(user.index..=user.index),
        }
    }

    /// Advance the read position for an address. Never regresses.
    pub fn mark_read(&mut self, address: Address, index: u64) {
        let entry = self.last_read.entry(address).or_insert(index);
        if *entry < index {
            *entry = index;
        }
    }

    /// Last read index for an address, if any.
    pub fn last_read(&self, address: &Address) -> Option<u64> {
        self.last_read.get(address).copied()
    }

    /// Clear all read positions (session teardown).
    pub fn reset(&mut self) {
        self.last_read.clear();
    }
}
