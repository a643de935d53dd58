//! Session configuration.

use std::time::Duration;

use murmur_history::HistoryConfig;
use murmur_proto::Address;

/// How broadcast payloads reach the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    /// Subscribe and receive pushed payloads.
    Push,
    /// Pull the latest payload on every fetch tick. Used where the
    /// transport offers no subscription.
    Poll,
}

/// Configuration for a chat session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Chat room name; every participant derives the same topic from it.
    pub chat: String,

    /// Display name announced to peers.
    pub username: String,

    /// Expected own address. When set, sends fail unless the signer
    /// holds the matching key.
    pub address: Option<Address>,

    /// Push or poll delivery of broadcast payloads.
    pub delivery: DeliveryMode,

    /// Interval of the announce/evict/fetch tick.
    pub fetch_interval: Duration,

    /// Interval of the checkpoint publication tick.
    pub checkpoint_interval: Duration,

    /// Peers idle longer than this are evicted from the active set.
    pub idle_threshold: Duration,

    /// Poll interval inside broadcast convergence loops.
    pub convergence_interval: Duration,

    /// Re-broadcast budget of a convergence loop.
    pub convergence_retries: u32,

    /// Attempts per retried network operation.
    pub retry_attempts: u32,

    /// Flat delay between retried network operations.
    pub retry_delay: Duration,

    /// Failed download attempts before a reference is banned for good.
    pub max_ref_retries: u32,

    /// Serialized history snapshot ceiling before trimming.
    pub max_snapshot_bytes: usize,

    /// Message entries dropped per history trim.
    pub trim_batch: usize,

    /// Window of `fetch_previous_messages`, and the bound of its
    /// already-emitted cache.
    pub latest_window: usize,

    /// Reject announcements that would regress a peer's known feed
    /// index. Off by default: the last applied announcement wins, even
    /// when announcements arrive out of order.
    pub monotonic_upsert: bool,
}

impl SessionConfig {
    /// Defaults for a real deployment.
    pub fn new(chat: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            chat: chat.into(),
            username: username.into(),
            address: None,
            delivery: DeliveryMode::Push,
            fetch_interval: Duration::from_millis(500),
            checkpoint_interval: Duration::from_secs(5),
            idle_threshold: Duration::from_secs(300),
            convergence_interval: Duration::from_secs(1),
            convergence_retries: 10,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(200),
            max_ref_retries: 3,
            max_snapshot_bytes: 2 * 1024 * 1024,
            trim_batch: 10_000,
            latest_window: 10,
            monotonic_upsert: false,
        }
    }

    /// Tight intervals for tests and local demos.
    #[must_use]
    pub fn fast(chat: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            fetch_interval: Duration::from_millis(25),
            checkpoint_interval: Duration::from_millis(100),
            convergence_interval: Duration::from_millis(25),
            retry_delay: Duration::from_millis(5),
            ..Self::new(chat, username)
        }
    }

    /// Pin the expected own address.
    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = Some(address);
        self
    }

    /// Select push or poll delivery.
    #[must_use]
    pub fn with_delivery(mut self, delivery: DeliveryMode) -> Self {
        self.delivery = delivery;
        self
    }

    /// Set the fetch tick interval.
    #[must_use]
    pub fn with_fetch_interval(mut self, interval: Duration) -> Self {
        self.fetch_interval = interval;
        self
    }

    /// Set the checkpoint tick interval.
    #[must_use]
    pub fn with_checkpoint_interval(mut self, interval: Duration) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// Set the idle eviction threshold.
    #[must_use]
    pub fn with_idle_threshold(mut self, threshold: Duration) -> Self {
        self.idle_threshold = threshold;
        self
    }

    /// Set the convergence poll interval and retry budget.
    #[must_use]
    pub fn with_convergence(mut self, interval: Duration, retries: u32) -> Self {
        self.convergence_interval = interval;
        self.convergence_retries = retries;
        self
    }

    /// Set the network retry budget.
    #[must_use]
    pub fn with_retry(mut self, attempts: u32, delay: Duration) -> Self {
        self.retry_attempts = attempts;
        self.retry_delay = delay;
        self
    }

    /// Enforce per-peer feed index monotonicity on upsert.
    #[must_use]
    pub fn with_monotonic_upsert(mut self, enabled: bool) -> Self {
        self.monotonic_upsert = enabled;
        self
    }

    /// Derive the history store configuration.
    pub(crate) fn history_config(&self) -> HistoryConfig {
        HistoryConfig {
            max_snapshot_bytes: self.max_snapshot_bytes,
            trim_batch: self.trim_batch,
            latest_window: self.latest_window,
            retry_attempts: self.retry_attempts,
            retry_delay: self.retry_delay,
        }
    }
}
