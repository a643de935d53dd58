//! In-process implementation of the network collaborators.
//!
//! One `MemoryHive` stands in for the whole storage network: peers in the
//! same process share it (it is `Clone`) and observe each other's
//! uploads, feed writes and broadcasts. Broadcast delivery mimics the
//! real primitive: subscribers only see payloads published after they
//! subscribed, duplicates are possible, and a lagging subscriber drops
//! payloads rather than blocking the publisher.
//!
//! Downloads can be failure-injected per reference, and download calls
//! are counted per reference, which is what the ref-banning tests key on.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, RwLock};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};
use tracing::warn;

use murmur_proto::{Address, ObjectRef, Topic};

use crate::traits::{BroadcastClient, StorageClient, Subscription};
use crate::{Error, Result};

const CHANNEL_CAPACITY: usize = 256;

type FeedKey = (Topic, Address);
type ChannelKey = (Topic, String);

#[derive(Default)]
struct HiveInner {
    objects: RwLock<HashMap<ObjectRef, Vec<u8>>>,
    feeds: RwLock<HashMap<FeedKey, BTreeMap<u64, Vec<u8>>>>,
    channels: Mutex<HashMap<ChannelKey, broadcast::Sender<Vec<u8>>>>,
    latest: RwLock<HashMap<ChannelKey, Vec<u8>>>,
    failing_downloads: RwLock<HashSet<ObjectRef>>,
    download_counts: RwLock<HashMap<ObjectRef, u64>>,
}

/// Shared in-memory storage network + broadcast bus.
#[derive(Clone, Default)]
pub struct MemoryHive {
    inner: Arc<HiveInner>,
}

impl MemoryHive {
    /// Create an empty hive.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every download of `reference` fail with a network error
    /// until [`MemoryHive::restore_downloads_for`] is called.
    pub fn fail_downloads_for(&self, reference: ObjectRef) {
        self.inner.failing_downloads.write().unwrap().insert(reference);
    }

    /// Undo [`MemoryHive::fail_downloads_for`].
    pub fn restore_downloads_for(&self, reference: &ObjectRef) {
        self.inner.failing_downloads.write().unwrap().remove(reference);
    }

    /// How many times `download_object` has been called for `reference`,
    /// successful or not.
    pub fn download_count(&self, reference: &ObjectRef) -> u64 {
        self.inner
            .download_counts
            .read()
            .unwrap()
            .get(reference)
            .copied()
            .unwrap_or(0)
    }

    fn sender_for(&self, key: ChannelKey) -> broadcast::Sender<Vec<u8>> {
        let mut channels = self.inner.channels.lock().unwrap();
        channels
            .entry(key)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl StorageClient for MemoryHive {
    async fn upload_object(&self, bytes: Vec<u8>) -> Result<ObjectRef> {
        let reference = ObjectRef::from_bytes(*blake3::hash(&bytes).as_bytes());
        self.inner.objects.write().unwrap().insert(reference, bytes);
        Ok(reference)
    }

    async fn download_object(&self, reference: &ObjectRef) -> Result<Vec<u8>> {
        *self
            .inner
            .download_counts
            .write()
            .unwrap()
            .entry(*reference)
            .or_insert(0) += 1;

        if self.inner.failing_downloads.read().unwrap().contains(reference) {
            return Err(Error::Network(format!("download of {reference} failed")));
        }

        self.inner
            .objects
            .read()
            .unwrap()
            .get(reference)
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("object {reference}")))
    }

    async fn write_feed_entry(
        &self,
        topic: &Topic,
        owner: &Address,
        index: u64,
        payload: Vec<u8>,
    ) -> Result<()> {
        let mut feeds = self.inner.feeds.write().unwrap();
        let feed = feeds.entry((*topic, *owner)).or_default();
        if feed.contains_key(&index) {
            return Err(Error::Network(format!(
                "feed index {index} of {owner} already written"
            )));
        }
        feed.insert(index, payload);
        Ok(())
    }

    async fn read_feed_entry(&self, topic: &Topic, owner: &Address, index: u64) -> Result<Vec<u8>> {
        self.inner
            .feeds
            .read()
            .unwrap()
            .get(&(*topic, *owner))
            .and_then(|feed| feed.get(&index))
            .cloned()
            .ok_or_else(|| Error::NotFound(format!("feed entry {index} of {owner}")))
    }

    async fn latest_feed_index(&self, topic: &Topic, owner: &Address) -> Result<Option<u64>> {
        Ok(self
            .inner
            .feeds
            .read()
            .unwrap()
            .get(&(*topic, *owner))
            .and_then(|feed| feed.keys().next_back().copied()))
    }
}

#[async_trait]
impl BroadcastClient for MemoryHive {
    async fn send(&self, topic: &Topic, resource: &str, payload: Vec<u8>) -> Result<()> {
        let key = (*topic, resource.to_string());
        self.inner
            .latest
            .write()
            .unwrap()
            .insert(key.clone(), payload.clone());

        // No subscribers is fine; late joiners use fetch_latest.
        let _ = self.sender_for(key).send(payload);
        Ok(())
    }

    async fn subscribe(&self, topic: &Topic, resource: &str) -> Result<Subscription> {
        let mut bus_rx = self.sender_for((*topic, resource.to_string())).subscribe();
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);

        tokio::spawn(async move {
            loop {
                match bus_rx.recv().await {
                    Ok(payload) => {
                        if tx.send(payload).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "memory hive subscriber lagged, dropping payloads");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(Subscription::new(rx))
    }

    async fn fetch_latest(&self, topic: &Topic, resource: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .inner
            .latest
            .read()
            .unwrap()
            .get(&(*topic, resource.to_string()))
            .cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner() -> Address {
        Address::from_bytes([1u8; 32])
    }

    #[tokio::test]
    async fn object_roundtrip() {
        let hive = MemoryHive::new();
        let reference = hive.upload_object(b"hello".to_vec()).await.unwrap();
        assert_eq!(hive.download_object(&reference).await.unwrap(), b"hello");
        assert_eq!(hive.download_count(&reference), 1);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let hive = MemoryHive::new();
        let reference = ObjectRef::from_bytes([9u8; 32]);
        assert!(matches!(
            hive.download_object(&reference).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn injected_failures_count_downloads() {
        let hive = MemoryHive::new();
        let reference = hive.upload_object(b"data".to_vec()).await.unwrap();
        hive.fail_downloads_for(reference);

        for _ in 0..3 {
            assert!(matches!(
                hive.download_object(&reference).await,
                Err(Error::Network(_))
            ));
        }
        assert_eq!(hive.download_count(&reference), 3);

        hive.restore_downloads_for(&reference);
        assert!(hive.download_object(&reference).await.is_ok());
    }

    #[tokio::test]
    async fn feed_is_write_once_per_index() {
        let hive = MemoryHive::new();
        let topic = Topic::chat("lobby");

        assert_eq!(hive.latest_feed_index(&topic, &owner()).await.unwrap(), None);

        hive.write_feed_entry(&topic, &owner(), 0, b"a".to_vec())
            .await
            .unwrap();
        hive.write_feed_entry(&topic, &owner(), 1, b"b".to_vec())
            .await
            .unwrap();
        assert!(hive
            .write_feed_entry(&topic, &owner(), 1, b"dup".to_vec())
            .await
            .is_err());

        assert_eq!(
            hive.latest_feed_index(&topic, &owner()).await.unwrap(),
            Some(1)
        );
        assert_eq!(
            hive.read_feed_entry(&topic, &owner(), 0).await.unwrap(),
            b"a"
        );
        assert!(matches!(
            hive.read_feed_entry(&topic, &owner(), 5).await,
            Err(Error::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn broadcast_reaches_subscribers_and_latest() {
        let hive = MemoryHive::new();
        let topic = Topic::chat("lobby");

        let mut sub = hive.subscribe(&topic, "users").await.unwrap();
        hive.send(&topic, "users", b"announce".to_vec()).await.unwrap();

        let received = sub.recv().await.unwrap();
        assert_eq!(received, b"announce");

        assert_eq!(
            hive.fetch_latest(&topic, "users").await.unwrap(),
            Some(b"announce".to_vec())
        );
        assert_eq!(hive.fetch_latest(&topic, "updater").await.unwrap(), None);
    }

    #[tokio::test]
    async fn peers_share_one_hive() {
        let hive = MemoryHive::new();
        let peer_view = hive.clone();
        let topic = Topic::chat("lobby");

        let reference = hive.upload_object(b"shared".to_vec()).await.unwrap();
        assert_eq!(
            peer_view.download_object(&reference).await.unwrap(),
            b"shared"
        );

        let mut sub = peer_view.subscribe(&topic, "users").await.unwrap();
        hive.send(&topic, "users", b"ping".to_vec()).await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), b"ping");
    }
}
