//! Murmur session engine
//!
//! The convergence core of the serverless chat: who is active, what the
//! shared history is, and who writes the next checkpoint — agreed among
//! mutually distrusting, intermittently-connected peers without a
//! central coordinator.
//!
//! # Moving parts
//!
//! - [`ActiveUserRegistry`] — last-write-wins view of currently
//!   participating peers, idle-evicted, and the pool the next history
//!   updater is drawn from
//! - [`RefLedger`] — bounded retry accounting per content reference;
//!   references that keep failing are banned permanently so one bad
//!   checkpoint cannot starve the fetch pipeline
//! - [`wait_for_broadcast`] — fire-and-forget broadcast turned into a
//!   bounded-retry confirmation by polling a local condition
//! - [`UpdaterCoordinator`] — candidate buffer and mutual exclusion for
//!   the rotating single-writer checkpoint role
//! - [`MessageFetchPipeline`] — per-peer feed read planning with an
//!   index cache that absorbs duplicate announcements
//! - [`ChatSession`] — wires the above to the collaborators and exposes
//!   the start/stop/send/fetch-previous lifecycle
//!
//! # Concurrency
//!
//! Everything runs as cooperative tokio tasks owned by the session: a
//! fetch tick, a checkpoint tick, and (under push delivery) one handler
//! task per broadcast resource. All of them shut down through a shared
//! watch channel. The coordinator's candidate buffer is the only
//! structure touched by two tasks at once and is the only one behind a
//! mutex.

mod config;
mod convergence;
mod coordinator;
mod error;
mod events;
mod fetch;
mod ledger;
mod registry;
mod session;

pub use config::{DeliveryMode, SessionConfig};
pub use convergence::{wait_for_broadcast, ConvergenceParams};
pub use coordinator::UpdaterCoordinator;
pub use error::{Error, Result};
pub use events::SessionEvent;
pub use fetch::MessageFetchPipeline;
pub use ledger::RefLedger;
pub use registry::ActiveUserRegistry;
pub use session::ChatSession;
