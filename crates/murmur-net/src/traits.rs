//! Collaborator trait definitions.

use async_trait::async_trait;
use tokio::sync::mpsc;

use murmur_proto::{Address, ObjectRef, Topic};

use crate::Result;

/// Content-addressed storage network with owner-signed feeds.
///
/// Objects are immutable blobs addressed by their content. Feeds are
/// append-only sequences addressed by `(topic, owner, index)`; only the
/// owner can write, anyone can read.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Upload an immutable object, returning its content address.
    async fn upload_object(&self, bytes: Vec<u8>) -> Result<ObjectRef>;

    /// Download the object at a content address.
    async fn download_object(&self, reference: &ObjectRef) -> Result<Vec<u8>>;

    /// Write the feed entry at `index`. Each index can be written once.
    async fn write_feed_entry(
        &self,
        topic: &Topic,
        owner: &Address,
        index: u64,
        payload: Vec<u8>,
    ) -> Result<()>;

    /// Read the feed entry at `index`. Fails with [`Error::NotFound`]
    /// when the index has no entry.
    ///
    /// [`Error::NotFound`]: crate::Error::NotFound
    async fn read_feed_entry(&self, topic: &Topic, owner: &Address, index: u64) -> Result<Vec<u8>>;

    /// Highest written index of a feed, or `None` when the feed is empty.
    ///
    /// The underlying network reports an empty feed as index `-1`;
    /// implementations translate that sentinel to `None`.
    async fn latest_feed_index(&self, topic: &Topic, owner: &Address) -> Result<Option<u64>>;
}

/// A live subscription to one broadcast resource.
///
/// Dropping the subscription unsubscribes.
pub struct Subscription {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl Subscription {
    /// Wrap a channel receiver fed by the transport.
    pub fn new(rx: mpsc::Receiver<Vec<u8>>) -> Self {
        Self { rx }
    }

    /// Receive the next payload, or `None` once the transport is gone.
    pub async fn recv(&mut self) -> Option<Vec<u8>> {
        self.rx.recv().await
    }
}

/// Gossip broadcast primitive ("graffiti" chunk).
///
/// Any holder of the topic can publish a small payload observable by all
/// subscribers. Delivery is at-least-once and best-effort; payloads may
/// arrive duplicated, reordered, or not at all. `fetch_latest` is the
/// pull-side fallback used when push delivery is unavailable.
#[async_trait]
pub trait BroadcastClient: Send + Sync {
    /// Publish a payload on `(topic, resource)`.
    async fn send(&self, topic: &Topic, resource: &str, payload: Vec<u8>) -> Result<()>;

    /// Subscribe to payloads published on `(topic, resource)`.
    async fn subscribe(&self, topic: &Topic, resource: &str) -> Result<Subscription>;

    /// Fetch the most recently published payload, if any.
    async fn fetch_latest(&self, topic: &Topic, resource: &str) -> Result<Option<Vec<u8>>>;
}

/// The local identity's signing capability.
pub trait Signer: Send + Sync {
    /// Sign a payload, returning the detached signature bytes.
    fn sign(&self, payload: &[u8]) -> Vec<u8>;

    /// Raw ed25519 verifying key.
    fn public_key(&self) -> [u8; 32];

    /// Peer address derived from the verifying key.
    fn address(&self) -> Address;
}
