//! Murmur history engine
//!
//! The shared chat history is a CRDT-like ledger of per-user feed
//! positions, periodically checkpointed to the storage network by a
//! rotating single writer and re-broadcast so late joiners can
//! reconstruct history without replaying every gossip payload.
//!
//! # Merge semantics
//!
//! Snapshots merge per user, per field, with key-based de-duplication:
//! membership events by `(kind, timestamp)`, message entries by feed
//! index. The merge is commutative and idempotent by construction, so
//! applying the same remote snapshot twice is a no-op — a required
//! property given at-least-once broadcast delivery.
//!
//! # Forgetting
//!
//! History is bounded: once the serialized snapshot exceeds its size
//! budget, the oldest message entries are dropped in a batch. Trimming is
//! lossy and intentional; old history is allowed to be forgotten.

mod error;
mod merge;
mod store;

pub use error::{Error, Result};
pub use merge::{merge_snapshots, trim_snapshot};
pub use store::{HistoryConfig, HistoryStore, StoreState};
