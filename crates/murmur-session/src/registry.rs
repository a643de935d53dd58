//! Active-user registry.

use std::collections::HashMap;
use std::time::Duration;

use rand::seq::SliceRandom;
use rand::Rng;
use tracing::trace;

use murmur_proto::{ActiveUser, Address};

/// In-memory map of currently participating peers, keyed by address.
///
/// Updated from validated announcements with last-applied-wins
/// semantics: whichever announcement is applied last locally wins, which
/// can momentarily regress a peer's known feed index when announcements
/// arrive out of order. `monotonic` switches that to rejecting stale
/// indexes instead.
#[derive(Debug)]
pub struct ActiveUserRegistry {
    users: HashMap<Address, ActiveUser>,
    monotonic: bool,
}

impl ActiveUserRegistry {
    /// Create an empty registry.
    pub fn new(monotonic: bool) -> Self {
        Self {
            users: HashMap::new(),
            monotonic,
        }
    }

    /// Apply an announcement. Returns whether it was stored.
    pub fn upsert(&mut self, user: ActiveUser) -> bool {
        if self.monotonic {
            if let Some(existing) = self.users.get(&user.address) {
                if user.index < existing.index {
                    trace!(
                        address = %user.address,
                        announced = user.index,
                        known = existing.index,
                        "ignoring stale announcement"
                    );
                    return false;
                }
            }
        }
        self.users.insert(user.address, user);
        true
    }

    /// Remove every peer idle longer than `threshold` as of `now`
    /// (Unix milliseconds). Returns the evicted peers.
    pub fn evict_idle(&mut self, threshold: Duration, now: u64) -> Vec<ActiveUser> {
        let threshold_ms = threshold.as_millis() as u64;
        let mut evicted = Vec::new();
        self.users.retain(|_, user| {
            let idle = now.saturating_sub(user.timestamp) > threshold_ms;
            if idle {
                evicted.push(user.clone());
            }
            !idle
        });
        evicted
    }

    /// Pick the next history updater uniformly at random, falling back
    /// to `self_address` when nobody is active.
    ///
    /// `thread_rng` is cryptographically strong; this is a fairness
    /// mechanism, not a security boundary.
    pub fn pick_random_updater(&self, self_address: Address) -> Address {
        self.pick_with(&mut rand::thread_rng(), self_address)
    }

    /// Deterministically seedable variant of [`Self::pick_random_updater`].
    pub fn pick_with<R: Rng>(&self, rng: &mut R, self_address: Address) -> Address {
        let mut addresses: Vec<Address> = self.users.keys().copied().collect();
        addresses.sort();
        addresses.choose(rng).copied().unwrap_or(self_address)
    }

    /// Check whether an address is currently active.
    pub fn contains(&self, address: &Address) -> bool {
        self.users.contains_key(address)
    }

    /// Look up a peer's latest announcement.
    pub fn get(&self, address: &Address) -> Option<&ActiveUser> {
        self.users.get(address)
    }

    /// Clone out the current active set.
    pub fn snapshot(&self) -> Vec<ActiveUser> {
        self.users.values().cloned().collect()
    }

    /// Number of active peers.
    pub fn len(&self) -> usize {
        self.users.len()
    }

    /// Check if nobody is active.
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Drop all peers (session teardown).
    pub fn clear(&mut self) {
        self.users.clear();
    }
}
