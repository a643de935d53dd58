//! Checkpoint-backed history store.

use std::collections::VecDeque;
use std::time::Duration;

use tracing::{debug, info, warn};

use murmur_net::{retry, BroadcastClient, StorageClient};
use murmur_proto::{
    unix_millis, validate, ActiveUser, Address, CheckpointEntry, HistorySnapshot, MessageEntry,
    Topic, UserEvent, UserEventKind, UserHistory, UPDATER_RESOURCE,
};

use crate::merge::{merge_snapshots, trim_snapshot};
use crate::Result;

/// Tunables for the history store.
#[derive(Debug, Clone)]
pub struct HistoryConfig {
    /// Serialized snapshot ceiling before a trim kicks in.
    pub max_snapshot_bytes: usize,

    /// Message entries dropped per trim.
    pub trim_batch: usize,

    /// Window for [`HistoryStore::select_latest_messages`] and its
    /// already-emitted cache.
    pub latest_window: usize,

    /// Attempts per snapshot download.
    pub retry_attempts: u32,

    /// Flat delay between download attempts.
    pub retry_delay: Duration,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_snapshot_bytes: 2 * 1024 * 1024,
            trim_batch: 10_000,
            latest_window: 10,
            retry_attempts: 3,
            retry_delay: Duration::from_millis(200),
        }
    }
}

/// Initialization state, entered once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreState {
    /// `init` has not run.
    Uninitialized,
    /// No checkpoint existed; running from a bootstrap entry.
    DefaultEntry,
    /// A published checkpoint was adopted (and its snapshot merged when
    /// reachable).
    RemoteEntry,
}

/// Local view of the shared chat history.
///
/// Owns the merged snapshot and the currently adopted checkpoint entry.
/// Pure state apart from [`HistoryStore::init`], which talks to the
/// collaborators once to adopt whatever checkpoint the chat already has.
#[derive(Debug)]
pub struct HistoryStore {
    config: HistoryConfig,
    chat_topic: Topic,
    self_address: Address,
    snapshot: HistorySnapshot,
    entry: Option<CheckpointEntry>,
    state: StoreState,
    /// Recently emitted `(address, index)` pairs, bounded at
    /// `latest_window`, so repeated selection does not re-emit messages
    /// the client has already displayed.
    emitted: VecDeque<(Address, u64)>,
}

impl HistoryStore {
    /// Create an uninitialized store.
    pub fn new(config: HistoryConfig, chat_topic: Topic, self_address: Address) -> Self {
        Self {
            config,
            chat_topic,
            self_address,
            snapshot: HistorySnapshot::new(),
            entry: None,
            state: StoreState::Uninitialized,
            emitted: VecDeque::new(),
        }
    }

    /// Current initialization state.
    pub fn state(&self) -> StoreState {
        self.state
    }

    /// The currently adopted checkpoint entry, if initialized.
    pub fn entry(&self) -> Option<&CheckpointEntry> {
        self.entry.as_ref()
    }

    /// Generation of the adopted checkpoint, 0 before init.
    pub fn generation(&self) -> u64 {
        self.entry.as_ref().map(|e| e.generation).unwrap_or(0)
    }

    /// The merged snapshot.
    pub fn snapshot(&self) -> &HistorySnapshot {
        &self.snapshot
    }

    /// Adopt the chat's existing checkpoint, or bootstrap a default one.
    ///
    /// Fetches the latest checkpoint pointer from the broadcast
    /// collaborator. A malformed pointer, or a snapshot that stays
    /// unreachable through the retry budget, degrades to an empty local
    /// history rather than failing the session: checkpoints are additive
    /// and redundant, the next one restores what this one carried.
    pub async fn init<S, B>(&mut self, storage: &S, bus: &B) -> Result<()>
    where
        S: StorageClient + ?Sized,
        B: BroadcastClient + ?Sized,
    {
        let latest = bus.fetch_latest(&self.chat_topic, UPDATER_RESOURCE).await?;

        let entry = match latest {
            None => None,
            Some(bytes) => match validate::parse_checkpoint(&bytes) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(%err, "ignoring malformed checkpoint pointer, starting fresh");
                    None
                }
            },
        };

        match entry {
            None => {
                self.entry = Some(CheckpointEntry::bootstrap(self.self_address, unix_millis()));
                self.state = StoreState::DefaultEntry;
                info!("no checkpoint found, starting with bootstrap entry");
            }
            Some(entry) => {
                if let Some(reference) = entry.reference {
                    let downloaded = retry(
                        "download checkpoint snapshot",
                        self.config.retry_attempts,
                        self.config.retry_delay,
                        || storage.download_object(&reference),
                    )
                    .await;

                    match downloaded {
                        Ok(bytes) => match validate::parse_snapshot(&bytes) {
                            Ok(remote) => {
                                self.merge_remote(remote);
                                debug!(%reference, "merged checkpoint snapshot");
                            }
                            Err(err) => {
                                warn!(%reference, %err, "discarding malformed checkpoint snapshot");
                            }
                        },
                        Err(err) => {
                            warn!(%reference, %err, "checkpoint snapshot unreachable, starting without it");
                        }
                    }
                }
                info!(generation = entry.generation, "adopted existing checkpoint");
                self.entry = Some(entry);
                self.state = StoreState::RemoteEntry;
            }
        }

        self.trim();
        Ok(())
    }

    /// Adopt `entry` if it supersedes the current one. Returns whether it
    /// was adopted.
    pub fn observe_entry(&mut self, entry: CheckpointEntry) -> bool {
        let newer = match &self.entry {
            Some(current) => entry.is_newer_than(current),
            None => true,
        };
        if newer {
            debug!(generation = entry.generation, "adopting newer checkpoint entry");
            self.entry = Some(entry);
        }
        newer
    }

    /// Merge a downloaded remote snapshot into local history.
    pub fn merge_remote(&mut self, remote: HistorySnapshot) {
        self.snapshot = merge_snapshots(&self.snapshot, &remote);
    }

    /// Fold the current active-user view into history: one message entry
    /// per user at their latest announced index.
    pub fn update_local(&mut self, users: &[ActiveUser]) {
        if users.is_empty() {
            return;
        }
        let mut local = HistorySnapshot::new();
        for user in users {
            local.users.insert(
                user.address,
                UserHistory {
                    username: user.username.clone(),
                    events: vec![],
                    message_entries: vec![MessageEntry {
                        index: user.index,
                        timestamp: user.timestamp,
                    }],
                },
            );
        }
        self.snapshot = merge_snapshots(&self.snapshot, &local);
    }

    /// Record a membership event for an address.
    pub fn record_event(
        &mut self,
        address: Address,
        username: &str,
        kind: UserEventKind,
        timestamp: u64,
    ) {
        let mut local = HistorySnapshot::new();
        local.users.insert(
            address,
            UserHistory {
                username: username.to_string(),
                events: vec![UserEvent { kind, timestamp }],
                message_entries: vec![],
            },
        );
        self.snapshot = merge_snapshots(&self.snapshot, &local);
    }

    /// Enforce the size budget.
    pub fn trim(&mut self) {
        trim_snapshot(
            &mut self.snapshot,
            self.config.max_snapshot_bytes,
            self.config.trim_batch,
        );
    }

    /// Serialize the snapshot for upload.
    pub fn to_upload_bytes(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(&self.snapshot)?)
    }

    /// The newest message entries not yet handed to the client, at most
    /// `latest_window` of them, newest first.
    pub fn select_latest_messages(&mut self) -> Vec<(Address, MessageEntry)> {
        let mut flat: Vec<(Address, MessageEntry)> = self
            .snapshot
            .users
            .iter()
            .flat_map(|(address, user)| {
                user.message_entries
                    .iter()
                    .map(move |entry| (*address, *entry))
            })
            .collect();
        flat.sort_by_key(|(address, entry)| {
            std::cmp::Reverse((entry.timestamp, entry.index, *address))
        });

        let mut selected = Vec::new();
        for (address, entry) in flat {
            if selected.len() == self.config.latest_window {
                break;
            }
            if self.emitted.contains(&(address, entry.index)) {
                continue;
            }
            self.emitted.push_back((address, entry.index));
            while self.emitted.len() > self.config.latest_window {
                self.emitted.pop_front();
            }
            selected.push((address, entry));
        }
        selected
    }

    /// Username recorded for an address, if any.
    pub fn username_of(&self, address: &Address) -> Option<&str> {
        self.snapshot
            .users
            .get(address)
            .map(|u| u.username.as_str())
            .filter(|name| !name.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use murmur_net::MemoryHive;
    use murmur_proto::ObjectRef;

    fn addr(seed: u8) -> Address {
        Address::from_bytes([seed; 32])
    }

    fn store() -> HistoryStore {
        HistoryStore::new(HistoryConfig::default(), Topic::chat("lobby"), addr(1))
    }

    fn active_user(seed: u8, index: u64, timestamp: u64) -> ActiveUser {
        ActiveUser {
            address: addr(seed),
            username: format!("user-{seed}"),
            timestamp,
            index,
            public_key: vec![0u8; 32],
            signature: vec![],
        }
    }

    #[tokio::test]
    async fn init_without_checkpoint_bootstraps() {
        let hive = MemoryHive::new();
        let mut store = store();

        store.init(&hive, &hive).await.unwrap();

        assert_eq!(store.state(), StoreState::DefaultEntry);
        let entry = store.entry().unwrap();
        assert_eq!(entry.generation, 0);
        assert_eq!(entry.updater, addr(1));
        assert!(entry.reference.is_none());
    }

    #[tokio::test]
    async fn init_adopts_published_checkpoint() {
        let hive = MemoryHive::new();
        let topic = Topic::chat("lobby");

        // A previous updater uploaded a snapshot and announced it.
        let mut remote = HistorySnapshot::new();
        remote.users.insert(
            addr(7),
            UserHistory {
                username: "grace".into(),
                events: vec![],
                message_entries: vec![MessageEntry { index: 2, timestamp: 50 }],
            },
        );
        let reference = hive
            .upload_object(serde_json::to_vec(&remote).unwrap())
            .await
            .unwrap();
        let entry = CheckpointEntry {
            generation: 4,
            reference: Some(reference),
            updater: addr(9),
            timestamp: 60,
        };
        hive.send(&topic, UPDATER_RESOURCE, serde_json::to_vec(&entry).unwrap())
            .await
            .unwrap();

        let mut store = store();
        store.init(&hive, &hive).await.unwrap();

        assert_eq!(store.state(), StoreState::RemoteEntry);
        assert_eq!(store.generation(), 4);
        assert_eq!(store.username_of(&addr(7)), Some("grace"));
        assert_eq!(store.snapshot().total_entries(), 1);
    }

    #[tokio::test]
    async fn init_survives_unreachable_snapshot() {
        let hive = MemoryHive::new();
        let topic = Topic::chat("lobby");

        let entry = CheckpointEntry {
            generation: 2,
            reference: Some(ObjectRef::from_bytes([8u8; 32])),
            updater: addr(9),
            timestamp: 60,
        };
        hive.send(&topic, UPDATER_RESOURCE, serde_json::to_vec(&entry).unwrap())
            .await
            .unwrap();

        let mut store = HistoryStore::new(
            HistoryConfig {
                retry_attempts: 2,
                retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
            topic,
            addr(1),
        );
        store.init(&hive, &hive).await.unwrap();

        // Entry adopted, snapshot degraded to empty.
        assert_eq!(store.state(), StoreState::RemoteEntry);
        assert_eq!(store.generation(), 2);
        assert!(store.snapshot().is_empty());
    }

    #[tokio::test]
    async fn init_ignores_malformed_pointer() {
        let hive = MemoryHive::new();
        let topic = Topic::chat("lobby");
        hive.send(&topic, UPDATER_RESOURCE, b"not a checkpoint".to_vec())
            .await
            .unwrap();

        let mut store = store();
        store.init(&hive, &hive).await.unwrap();
        assert_eq!(store.state(), StoreState::DefaultEntry);
    }

    #[test]
    fn observe_entry_keeps_newest() {
        let mut store = store();
        assert!(store.observe_entry(CheckpointEntry::bootstrap(addr(1), 10)));

        let newer = CheckpointEntry {
            generation: 1,
            reference: Some(ObjectRef::from_bytes([2u8; 32])),
            updater: addr(2),
            timestamp: 5,
        };
        assert!(store.observe_entry(newer.clone()));
        assert!(!store.observe_entry(CheckpointEntry::bootstrap(addr(1), 99)));
        assert_eq!(store.entry(), Some(&newer));
    }

    #[test]
    fn update_local_folds_registry_view() {
        let mut store = store();
        store.update_local(&[active_user(2, 3, 100), active_user(3, 0, 90)]);

        assert_eq!(store.snapshot().total_entries(), 2);
        assert_eq!(store.username_of(&addr(2)), Some("user-2"));

        // Re-folding the same view is a no-op (merge idempotence).
        store.update_local(&[active_user(2, 3, 100)]);
        assert_eq!(store.snapshot().total_entries(), 2);
    }

    #[test]
    fn select_latest_does_not_re_emit() {
        let mut store = store();
        store.update_local(&[active_user(2, 0, 100), active_user(3, 0, 90)]);

        let first = store.select_latest_messages();
        assert_eq!(first.len(), 2);
        // Newest first.
        assert_eq!(first[0].0, addr(2));

        let second = store.select_latest_messages();
        assert!(second.is_empty());

        // A new entry shows up once.
        store.update_local(&[active_user(2, 1, 110)]);
        let third = store.select_latest_messages();
        assert_eq!(third.len(), 1);
        assert_eq!(third[0].1.index, 1);
    }

    #[test]
    fn select_latest_respects_window() {
        let mut store = HistoryStore::new(
            HistoryConfig { latest_window: 3, ..Default::default() },
            Topic::chat("lobby"),
            addr(1),
        );
        let users: Vec<ActiveUser> =
            (2..12).map(|s| active_user(s, 0, 100 + s as u64)).collect();
        store.update_local(&users);

        assert_eq!(store.select_latest_messages().len(), 3);
    }

    #[test]
    fn record_event_is_idempotent() {
        let mut store = store();
        store.record_event(addr(2), "bob", UserEventKind::Joined, 50);
        store.record_event(addr(2), "bob", UserEventKind::Joined, 50);

        assert_eq!(store.snapshot().users[&addr(2)].events.len(), 1);
    }
}
