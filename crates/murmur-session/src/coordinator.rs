//! Updater coordination: the rotating single-writer checkpoint role.
//!
//! Concurrent uploads of divergent checkpoints would fork the history.
//! Instead, each published checkpoint entry names the peer elected (at
//! random, by the publisher) to produce the next one; a peer only acts
//! on entries naming itself. That serializes writes across the whole
//! group without a lock server — a lightweight leader rotation adequate
//! for chat-sized groups.

use std::collections::HashSet;

use tokio::sync::Mutex;
use tracing::{debug, trace};

use murmur_proto::{Address, CheckpointEntry, ObjectRef};

type CandidateKey = (u64, Option<ObjectRef>);

#[derive(Debug, Default)]
struct CoordinatorInner {
    /// Candidate entries naming this peer as updater.
    candidates: Vec<CheckpointEntry>,
    /// Keys of candidates already consumed by a publication.
    processed: HashSet<CandidateKey>,
}

/// Buffers candidate checkpoint entries and serializes the
/// read-modify-write of the buffer and the processed set.
///
/// The mutex is load-bearing: the checkpoint timer task and the incoming
/// broadcast handler touch this state concurrently. Everything else in
/// the session is single-writer and needs no lock.
#[derive(Debug)]
pub struct UpdaterCoordinator {
    self_address: Address,
    inner: Mutex<CoordinatorInner>,
}

impl UpdaterCoordinator {
    /// Create a coordinator for the local peer.
    pub fn new(self_address: Address) -> Self {
        Self {
            self_address,
            inner: Mutex::new(CoordinatorInner::default()),
        }
    }

    /// Offer an observed checkpoint entry. Buffered only when it names
    /// this peer as updater and has not been consumed or buffered
    /// already. Returns whether it was buffered.
    pub async fn on_candidate_observed(&self, entry: CheckpointEntry) -> bool {
        if entry.updater != self.self_address {
            trace!(updater = %entry.updater, "entry names another updater, ignoring");
            return false;
        }

        let key = entry.candidate_key();
        let mut inner = self.inner.lock().await;
        if inner.processed.contains(&key) {
            return false;
        }
        if inner.candidates.iter().any(|c| c.candidate_key() == key) {
            return false;
        }
        debug!(generation = entry.generation, "buffered checkpoint candidate");
        inner.candidates.push(entry);
        true
    }

    /// The best unconsumed candidate: highest `(generation, timestamp)`,
    /// deterministically tie-broken by reference. `None` when there is
    /// nothing to act on.
    pub async fn select_best(&self) -> Option<CheckpointEntry> {
        let inner = self.inner.lock().await;
        inner
            .candidates
            .iter()
            .filter(|c| !inner.processed.contains(&c.candidate_key()))
            .max_by_key(|c| (c.ordering_key(), c.reference))
            .cloned()
    }

    /// Consume a candidate after its checkpoint was published: mark it
    /// processed and drop it — along with anything it superseded — from
    /// the buffer.
    pub async fn mark_published(&self, consumed: &CheckpointEntry) {
        let mut inner = self.inner.lock().await;
        inner.processed.insert(consumed.candidate_key());
        inner
            .candidates
            .retain(|c| c.generation > consumed.generation);
    }

    /// Number of buffered candidates.
    pub async fn buffered(&self) -> usize {
        self.inner.lock().await.candidates.len()
    }

    /// Clear all state (session teardown).
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        inner.candidates.clear();
        inner.processed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn me() -> Address {
        Address::from_bytes([1u8; 32])
    }

    fn entry(generation: u64, timestamp: u64, updater: Address, ref_seed: u8) -> CheckpointEntry {
        CheckpointEntry {
            generation,
            reference: Some(ObjectRef::from_bytes([ref_seed; 32])),
            updater,
            timestamp,
        }
    }

    #[tokio::test]
    async fn ignores_entries_for_other_updaters() {
        let coordinator = UpdaterCoordinator::new(me());
        let other = Address::from_bytes([2u8; 32]);

        assert!(!coordinator.on_candidate_observed(entry(1, 10, other, 1)).await);
        assert_eq!(coordinator.buffered().await, 0);
        assert!(coordinator.select_best().await.is_none());
    }

    #[tokio::test]
    async fn deduplicates_buffered_candidates() {
        let coordinator = UpdaterCoordinator::new(me());

        assert!(coordinator.on_candidate_observed(entry(1, 10, me(), 1)).await);
        // Same generation and reference: at-least-once delivery echo.
        assert!(!coordinator.on_candidate_observed(entry(1, 99, me(), 1)).await);
        assert_eq!(coordinator.buffered().await, 1);
    }

    #[tokio::test]
    async fn selects_highest_generation_then_timestamp() {
        let coordinator = UpdaterCoordinator::new(me());
        coordinator.on_candidate_observed(entry(1, 50, me(), 1)).await;
        coordinator.on_candidate_observed(entry(2, 10, me(), 2)).await;
        coordinator.on_candidate_observed(entry(2, 40, me(), 3)).await;

        let best = coordinator.select_best().await.unwrap();
        assert_eq!(best.generation, 2);
        assert_eq!(best.timestamp, 40);

        // Deterministic across repeated calls with the same buffer.
        assert_eq!(coordinator.select_best().await.unwrap(), best);
    }

    #[tokio::test]
    async fn published_candidates_are_consumed() {
        let coordinator = UpdaterCoordinator::new(me());
        let first = entry(1, 50, me(), 1);
        coordinator.on_candidate_observed(first.clone()).await;
        coordinator.on_candidate_observed(entry(1, 20, me(), 2)).await;

        coordinator.mark_published(&first).await;

        // The consumed entry and its superseded sibling are gone, and a
        // re-observed copy of the consumed entry stays out.
        assert_eq!(coordinator.buffered().await, 0);
        assert!(!coordinator.on_candidate_observed(first).await);
        assert!(coordinator.select_best().await.is_none());
    }

    #[tokio::test]
    async fn newer_candidates_survive_publication() {
        let coordinator = UpdaterCoordinator::new(me());
        let old = entry(1, 50, me(), 1);
        coordinator.on_candidate_observed(old.clone()).await;
        coordinator.on_candidate_observed(entry(3, 10, me(), 2)).await;

        coordinator.mark_published(&old).await;

        let best = coordinator.select_best().await.unwrap();
        assert_eq!(best.generation, 3);
    }

    #[tokio::test]
    async fn bootstrap_entry_without_reference_is_a_candidate() {
        let coordinator = UpdaterCoordinator::new(me());
        let bootstrap = CheckpointEntry::bootstrap(me(), 5);

        assert!(coordinator.on_candidate_observed(bootstrap.clone()).await);
        assert_eq!(coordinator.select_best().await.unwrap(), bootstrap);
    }
}
