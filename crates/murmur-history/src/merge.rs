//! Snapshot merge and trim.

use std::collections::{BTreeMap, BTreeSet};

use murmur_proto::{Address, HistorySnapshot, MessageEntry, UserEvent, UserHistory};
use tracing::debug;

/// Merge two snapshots into a new one.
///
/// Per user, per field, with key-based de-duplication: events by
/// `(kind, timestamp)`, message entries by feed index (first observation
/// of an index wins on timestamp conflicts). Result lists are sorted
/// ascending by timestamp. Commutative and idempotent.
pub fn merge_snapshots(a: &HistorySnapshot, b: &HistorySnapshot) -> HistorySnapshot {
    let mut merged = HistorySnapshot::new();

    for address in a.users.keys().chain(b.users.keys()) {
        if merged.users.contains_key(address) {
            continue;
        }
        let user = merge_user(a.users.get(address), b.users.get(address));
        merged.users.insert(*address, user);
    }

    merged
}

fn merge_user(a: Option<&UserHistory>, b: Option<&UserHistory>) -> UserHistory {
    let empty = UserHistory::default();
    let a = a.unwrap_or(&empty);
    let b = b.unwrap_or(&empty);

    // Events: dedup by (kind, timestamp), order by timestamp then kind.
    let mut event_keys: BTreeSet<(u64, murmur_proto::UserEventKind)> = BTreeSet::new();
    for event in a.events.iter().chain(b.events.iter()) {
        event_keys.insert((event.timestamp, event.kind));
    }
    let events = event_keys
        .into_iter()
        .map(|(timestamp, kind)| UserEvent { kind, timestamp })
        .collect();

    // Message entries: dedup by index; on timestamp conflict the earlier
    // observation wins so both merge orders agree on the survivor.
    let mut by_index: BTreeMap<u64, u64> = BTreeMap::new();
    for entry in a.message_entries.iter().chain(b.message_entries.iter()) {
        by_index
            .entry(entry.index)
            .and_modify(|ts| *ts = (*ts).min(entry.timestamp))
            .or_insert(entry.timestamp);
    }
    let mut message_entries: Vec<MessageEntry> = by_index
        .into_iter()
        .map(|(index, timestamp)| MessageEntry { index, timestamp })
        .collect();
    message_entries.sort_by_key(|e| (e.timestamp, e.index));

    UserHistory {
        username: pick_username(a, b),
        events,
        message_entries,
    }
}

fn latest_activity(user: &UserHistory) -> u64 {
    let event_ts = user.events.iter().map(|e| e.timestamp).max().unwrap_or(0);
    let entry_ts = user
        .message_entries
        .iter()
        .map(|e| e.timestamp)
        .max()
        .unwrap_or(0);
    event_ts.max(entry_ts)
}

fn pick_username(a: &UserHistory, b: &UserHistory) -> String {
    if a.username.is_empty() {
        return b.username.clone();
    }
    if b.username.is_empty() {
        return a.username.clone();
    }
    match latest_activity(a).cmp(&latest_activity(b)) {
        std::cmp::Ordering::Greater => a.username.clone(),
        std::cmp::Ordering::Less => b.username.clone(),
        // Tie: lexical max, so both merge orders agree.
        std::cmp::Ordering::Equal => a.username.clone().max(b.username.clone()),
    }
}

/// Drop the oldest `batch` message entries when the serialized snapshot
/// exceeds `max_bytes`. Returns the number of entries dropped.
pub fn trim_snapshot(snapshot: &mut HistorySnapshot, max_bytes: usize, batch: usize) -> usize {
    let size = snapshot.serialized_size();
    if size <= max_bytes {
        return 0;
    }

    let mut flat: Vec<(Address, MessageEntry)> = snapshot
        .users
        .iter()
        .flat_map(|(address, user)| {
            user.message_entries
                .iter()
                .map(move |entry| (*address, *entry))
        })
        .collect();
    flat.sort_by_key(|(address, entry)| (entry.timestamp, entry.index, *address));

    let dropped = batch.min(flat.len());
    let survivors = flat.split_off(dropped);

    for user in snapshot.users.values_mut() {
        user.message_entries.clear();
    }
    for (address, entry) in survivors {
        if let Some(user) = snapshot.users.get_mut(&address) {
            user.message_entries.push(entry);
        }
    }

    debug!(size, dropped, "trimmed history snapshot");
    dropped
}
