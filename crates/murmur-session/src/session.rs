//! Chat session orchestration.
//!
//! Wires the registry, ledger, history store, coordinator and fetch
//! pipeline to the network collaborators and runs them as cooperative
//! background tasks:
//!
//! - a fetch tick (announce self, poll broadcasts under pull delivery,
//!   evict idle peers, read announced feed entries)
//! - a checkpoint tick (act on buffered candidates naming this peer as
//!   updater)
//! - under push delivery, one handler task per broadcast resource
//!
//! All tasks stop through one watch channel. Holds no persistent state:
//! everything is reconstructed from the network on `start`.

use std::sync::Arc;

use tokio::sync::{broadcast, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use murmur_history::{HistoryStore, StoreState};
use murmur_net::{retry, BroadcastClient, Signer, StorageClient, Subscription};
use murmur_proto::{
    unix_millis, validate, ActiveUser, Address, CheckpointEntry, Message, MessageId, MessageKind,
    ObjectRef, Topic, UserEventKind, UPDATER_RESOURCE, USERS_RESOURCE,
};

use crate::convergence::{wait_for_broadcast, ConvergenceParams};
use crate::coordinator::UpdaterCoordinator;
use crate::fetch::{MessageFetchPipeline, Resolution};
use crate::ledger::RefLedger;
use crate::registry::ActiveUserRegistry;
use crate::{DeliveryMode, Error, Result, SessionConfig, SessionEvent};

const EVENT_CHANNEL_CAPACITY: usize = 128;

/// State owned by the session's single-writer tick tasks.
///
/// Guarded by a `RwLock` so the public accessors can peek at it, but by
/// construction only the fetch task mutates the registry and pipeline,
/// and no guard is held across an `await`.
struct SharedState {
    registry: ActiveUserRegistry,
    ledger: RefLedger,
    history: HistoryStore,
    pipeline: MessageFetchPipeline,
    /// Highest index written to the own feed, `None` before the first
    /// message.
    own_index: Option<u64>,
}

struct SessionRuntime {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

struct SessionInner {
    config: SessionConfig,
    storage: Arc<dyn StorageClient>,
    bus: Arc<dyn BroadcastClient>,
    signer: Arc<dyn Signer>,
    chat_topic: Topic,
    user_topic: Topic,
    address: Address,
    state: RwLock<SharedState>,
    coordinator: UpdaterCoordinator,
    events: broadcast::Sender<SessionEvent>,
    /// Serializes sends so two concurrent sends cannot race the same
    /// feed index.
    send_lock: Mutex<()>,
    runtime: Mutex<Option<SessionRuntime>>,
}

/// A participant's session in one chat room.
///
/// Cheap to clone; clones share the same session.
#[derive(Clone)]
pub struct ChatSession {
    inner: Arc<SessionInner>,
}

impl ChatSession {
    /// Create a session. Nothing touches the network until
    /// [`start`](Self::start).
    pub fn new(
        config: SessionConfig,
        storage: Arc<dyn StorageClient>,
        bus: Arc<dyn BroadcastClient>,
        signer: Arc<dyn Signer>,
    ) -> Self {
        let address = signer.address();
        let chat_topic = Topic::chat(&config.chat);
        let user_topic = Topic::user(&chat_topic, &address);
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);

        let state = SharedState {
            registry: ActiveUserRegistry::new(config.monotonic_upsert),
            ledger: RefLedger::new(config.max_ref_retries),
            history: HistoryStore::new(config.history_config(), chat_topic, address),
            pipeline: MessageFetchPipeline::new(),
            own_index: None,
        };

        Self {
            inner: Arc::new(SessionInner {
                config,
                storage,
                bus,
                signer,
                chat_topic,
                user_topic,
                address,
                state: RwLock::new(state),
                coordinator: UpdaterCoordinator::new(address),
                events,
                send_lock: Mutex::new(()),
                runtime: Mutex::new(None),
            }),
        }
    }

    /// Subscribe to session events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Own peer address.
    pub fn address(&self) -> Address {
        self.inner.address
    }

    /// The chat room topic.
    pub fn chat_topic(&self) -> Topic {
        self.inner.chat_topic
    }

    /// Current active peers, including the local one once its own
    /// announcement has come back through the gossip layer.
    pub async fn active_users(&self) -> Vec<ActiveUser> {
        self.inner.state.read().await.registry.snapshot()
    }

    /// Generation of the currently adopted history checkpoint.
    pub async fn history_generation(&self) -> u64 {
        self.inner.state.read().await.history.generation()
    }

    /// Start the session: reconstruct state from the network, begin the
    /// background tasks and announce this peer. Idempotent; a second
    /// start is a logged no-op.
    pub async fn start(&self) -> Result<()> {
        SessionInner::start(&self.inner).await
    }

    /// Stop the session: cancel the background tasks, drop the
    /// subscriptions and reset all transient state. Idempotent.
    pub async fn stop(&self) {
        SessionInner::stop(&self.inner).await;
    }

    /// Compose, sign, upload and announce a message.
    ///
    /// Never returns an error: the outcome arrives as
    /// [`SessionEvent::RequestUploaded`] or
    /// [`SessionEvent::RequestError`], after an immediate
    /// [`SessionEvent::RequestInitiated`]. Returns the message id.
    pub async fn send_message(
        &self,
        text: impl Into<String>,
        kind: MessageKind,
        target_id: Option<MessageId>,
        id: Option<MessageId>,
    ) -> MessageId {
        let id = id.unwrap_or_else(MessageId::random);
        self.inner.emit(SessionEvent::RequestInitiated { id: id.clone() });

        match self
            .inner
            .try_send(id.clone(), text.into(), kind, target_id)
            .await
        {
            Ok(()) => self.inner.emit(SessionEvent::RequestUploaded { id: id.clone() }),
            Err(err) => {
                warn!(%err, "send failed");
                self.inner.emit(SessionEvent::RequestError {
                    id: Some(id.clone()),
                    reason: err.to_string(),
                });
            }
        }
        id
    }

    /// Resolve the newest not-yet-displayed history entries into
    /// messages, oldest first. Brackets the work with
    /// [`SessionEvent::LoadingPrevious`].
    pub async fn fetch_previous_messages(&self) -> Result<Vec<Message>> {
        self.inner.emit(SessionEvent::LoadingPrevious(true));
        let result = self.inner.load_previous().await;
        self.inner.emit(SessionEvent::LoadingPrevious(false));
        result
    }
}

impl SessionInner {
    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    async fn start(self: &Arc<Self>) -> Result<()> {
        let mut runtime = self.runtime.lock().await;
        if runtime.is_some() {
            warn!("session already started, ignoring start");
            return Ok(());
        }
        info!(
            chat = %self.chat_topic,
            address = %self.address,
            username = %self.config.username,
            "starting chat session"
        );

        // Reconstruct state from the network.
        let bootstrap = {
            let mut state = self.state.write().await;
            state.own_index = match self
                .storage
                .latest_feed_index(&self.chat_topic, &self.address)
                .await
            {
                Ok(index) => index,
                Err(err) => {
                    warn!(%err, "could not read own feed position, assuming empty feed");
                    None
                }
            };
            state.history.init(self.storage.as_ref(), self.bus.as_ref()).await?;
            if state.history.state() == StoreState::DefaultEntry {
                state.history.entry().cloned()
            } else {
                None
            }
        };
        if let Some(entry) = bootstrap {
            // Nobody has ever checkpointed this chat; the bootstrap entry
            // names this peer, making it responsible for generation 1.
            self.coordinator.on_candidate_observed(entry).await;
        }

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if self.config.delivery == DeliveryMode::Push {
            for resource in [USERS_RESOURCE, UPDATER_RESOURCE] {
                let subscription = self.bus.subscribe(&self.chat_topic, resource).await?;
                let inner = Arc::clone(self);
                let shutdown = shutdown_rx.clone();
                tasks.push(tokio::spawn(async move {
                    inner.run_subscription(resource, subscription, shutdown).await;
                }));
            }
        }

        {
            let inner = Arc::clone(self);
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                inner.run_fetch_loop(shutdown).await;
            }));
        }
        {
            let inner = Arc::clone(self);
            let shutdown = shutdown_rx.clone();
            tasks.push(tokio::spawn(async move {
                inner.run_checkpoint_loop(shutdown).await;
            }));
        }
        {
            let inner = Arc::clone(self);
            tasks.push(tokio::spawn(async move {
                inner.run_join_announce(shutdown_rx).await;
            }));
        }

        *runtime = Some(SessionRuntime {
            shutdown: shutdown_tx,
            tasks,
        });
        Ok(())
    }

    async fn stop(self: &Arc<Self>) {
        let mut runtime = self.runtime.lock().await;
        let Some(rt) = runtime.take() else {
            debug!("session already stopped");
            return;
        };
        info!("stopping chat session");

        let _ = rt.shutdown.send(true);
        for task in rt.tasks {
            let _ = task.await;
        }

        {
            let mut state = self.state.write().await;
            state.ledger.reset();
            state.pipeline.reset();
            state.registry.clear();
        }
        self.coordinator.reset().await;
        info!("chat session stopped");
    }

    // ---- background loops -------------------------------------------------

    async fn run_subscription(
        self: Arc<Self>,
        resource: &'static str,
        mut subscription: Subscription,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                payload = subscription.recv() => {
                    match payload {
                        Some(bytes) => self.handle_gossip(resource, &bytes).await,
                        None => {
                            debug!(resource, "broadcast transport closed");
                            break;
                        }
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(resource, "subscription handler stopped");
    }

    async fn run_fetch_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.fetch_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.fetch_tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("fetch loop stopped");
    }

    async fn run_checkpoint_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.config.checkpoint_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => self.checkpoint_tick(&shutdown).await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("checkpoint loop stopped");
    }

    /// Announce this peer until its own announcement comes back through
    /// the gossip layer, confirming the chat can see it.
    async fn run_join_announce(self: Arc<Self>, shutdown: watch::Receiver<bool>) {
        let params = ConvergenceParams {
            max_retries: self.config.convergence_retries,
            interval: self.config.convergence_interval,
        };
        let announcer = Arc::clone(&self);
        let checker = Arc::clone(&self);

        let result = wait_for_broadcast(
            &params,
            shutdown,
            move || {
                let inner = Arc::clone(&announcer);
                async move { inner.announce_self().await }
            },
            move || {
                let inner = Arc::clone(&checker);
                async move { inner.state.read().await.registry.contains(&inner.address) }
            },
        )
        .await;

        match result {
            Ok(()) => info!("join announcement acknowledged"),
            Err(Error::Cancelled) => {}
            Err(err) => {
                warn!(%err, "join announcement not acknowledged");
                self.emit(SessionEvent::RequestError {
                    id: None,
                    reason: err.to_string(),
                });
            }
        }
    }

    // ---- gossip handling --------------------------------------------------

    async fn handle_gossip(&self, resource: &str, bytes: &[u8]) {
        match resource {
            USERS_RESOURCE => self.handle_user_payload(bytes).await,
            UPDATER_RESOURCE => self.handle_checkpoint_payload(bytes).await,
            other => warn!(resource = other, "payload on unknown resource"),
        }
    }

    async fn handle_user_payload(&self, bytes: &[u8]) {
        let user = match validate::parse_active_user(bytes) {
            Ok(user) => user,
            Err(err) => {
                warn!(%err, "discarding invalid user announcement");
                return;
            }
        };

        let joined = {
            let mut state = self.state.write().await;
            let is_new = !state.registry.contains(&user.address);
            let applied = state.registry.upsert(user.clone());
            if applied && is_new {
                state.history.record_event(
                    user.address,
                    &user.username,
                    UserEventKind::Joined,
                    user.timestamp,
                );
            }
            applied && is_new
        };

        if joined && user.address != self.address {
            debug!(address = %user.address, username = %user.username, "peer joined");
            self.emit(SessionEvent::UserJoined(user));
        }
    }

    async fn handle_checkpoint_payload(&self, bytes: &[u8]) {
        let entry = match validate::parse_checkpoint(bytes) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(%err, "discarding invalid checkpoint entry");
                return;
            }
        };

        {
            let mut state = self.state.write().await;
            state.history.observe_entry(entry.clone());
        }
        self.coordinator.on_candidate_observed(entry).await;
    }

    // ---- fetch tick -------------------------------------------------------

    async fn fetch_tick(&self) {
        if let Err(err) = self.announce_self().await {
            debug!(%err, "self announcement failed");
        }
        if self.config.delivery == DeliveryMode::Poll {
            self.poll_broadcasts().await;
        }
        self.evict_idle().await;
        self.pipeline_tick().await;
    }

    async fn announce_self(&self) -> Result<()> {
        let index = { self.state.read().await.own_index.unwrap_or(0) };
        let mut user = ActiveUser {
            address: self.address,
            username: self.config.username.clone(),
            timestamp: unix_millis(),
            index,
            public_key: self.signer.public_key().to_vec(),
            signature: vec![],
        };
        user.signature = self.signer.sign(&user.signable_bytes());
        let payload = serde_json::to_vec(&user)?;
        self.bus.send(&self.chat_topic, USERS_RESOURCE, payload).await?;
        Ok(())
    }

    async fn poll_broadcasts(&self) {
        match self.bus.fetch_latest(&self.chat_topic, USERS_RESOURCE).await {
            Ok(Some(bytes)) => self.handle_user_payload(&bytes).await,
            Ok(None) => {}
            Err(err) => debug!(%err, "users poll failed"),
        }
        match self.bus.fetch_latest(&self.chat_topic, UPDATER_RESOURCE).await {
            Ok(Some(bytes)) => self.handle_checkpoint_payload(&bytes).await,
            Ok(None) => {}
            Err(err) => debug!(%err, "updater poll failed"),
        }
    }

    async fn evict_idle(&self) {
        let now = unix_millis();
        let evicted = {
            let mut state = self.state.write().await;
            let evicted = state.registry.evict_idle(self.config.idle_threshold, now);
            for user in &evicted {
                state
                    .history
                    .record_event(user.address, &user.username, UserEventKind::Left, now);
            }
            evicted
        };
        for user in evicted {
            debug!(address = %user.address, "evicted idle peer");
            self.emit(SessionEvent::UserLeft(user.address));
        }
    }

    /// Best-effort per peer: a single unreachable feed must not block
    /// reading from the others, so per-user failures are logged and
    /// swallowed and the batch always completes.
    async fn pipeline_tick(&self) {
        let users = { self.state.read().await.registry.snapshot() };
        for user in users {
            if user.address == self.address {
                // Own sends are emitted locally at send time.
                continue;
            }
            if let Err(err) = self.fetch_user(&user).await {
                debug!(address = %user.address, %err, "per-user fetch failed, continuing");
            }
        }
    }

    async fn fetch_user(&self, user: &ActiveUser) -> Result<()> {
        let plan = { self.state.read().await.pipeline.plan(user) };
        let Some(plan) = plan else {
            return Ok(());
        };

        for index in plan {
            match self.resolve_feed_entry(&user.address, index).await? {
                Resolution::Message(msg) => {
                    {
                        let mut state = self.state.write().await;
                        state.pipeline.mark_read(user.address, index);
                    }
                    self.emit(SessionEvent::MessageReceived(*msg));
                }
                Resolution::Skipped => {
                    let mut state = self.state.write().await;
                    state.pipeline.mark_read(user.address, index);
                }
                Resolution::Pending => break,
            }
        }
        Ok(())
    }

    /// Read the feed entry at `(owner, index)` and resolve the message
    /// object it points to, driving the ref ledger.
    ///
    /// One download attempt per call; the ledger counts failures across
    /// ticks and bans the reference once the budget is gone.
    async fn resolve_feed_entry(&self, owner: &Address, index: u64) -> Result<Resolution> {
        let payload = self
            .storage
            .read_feed_entry(&self.chat_topic, owner, index)
            .await?;

        let reference = match validate::parse_feed_ref(&payload) {
            Ok(reference) => reference,
            Err(err) => {
                warn!(%owner, index, %err, "malformed feed entry, skipping permanently");
                return Ok(Resolution::Skipped);
            }
        };

        let should = { self.state.read().await.ledger.should_process(&reference) };
        if !should {
            return Ok(Resolution::Skipped);
        }

        match self.storage.download_object(&reference).await {
            Ok(bytes) => match validate::parse_message(&bytes) {
                Ok(msg) if msg.address == *owner && msg.index == index => {
                    self.state.write().await.ledger.mark_success(&reference);
                    Ok(Resolution::Message(Box::new(msg)))
                }
                Ok(msg) => {
                    warn!(
                        %owner,
                        index,
                        claimed_address = %msg.address,
                        claimed_index = msg.index,
                        "message does not match its feed slot"
                    );
                    self.state.write().await.ledger.mark_invalid(&reference);
                    Ok(Resolution::Skipped)
                }
                Err(err) => {
                    warn!(%reference, %err, "invalid message object");
                    self.state.write().await.ledger.mark_invalid(&reference);
                    Ok(Resolution::Skipped)
                }
            },
            Err(err) => {
                debug!(%reference, %err, "message download failed");
                let banned = self.state.write().await.ledger.mark_failure(&reference);
                if banned {
                    Ok(Resolution::Skipped)
                } else {
                    Ok(Resolution::Pending)
                }
            }
        }
    }

    // ---- checkpoint tick --------------------------------------------------

    async fn checkpoint_tick(self: &Arc<Self>, shutdown: &watch::Receiver<bool>) {
        let Some(candidate) = self.coordinator.select_best().await else {
            return;
        };
        debug!(
            generation = candidate.generation,
            "acting as updater for this round"
        );
        if let Err(err) = self.publish_checkpoint(candidate, shutdown.clone()).await {
            match err {
                Error::Cancelled => {}
                err => warn!(%err, "checkpoint publication failed, will retry"),
            }
        }
    }

    async fn publish_checkpoint(
        self: &Arc<Self>,
        candidate: CheckpointEntry,
        shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        // Fold the candidate's snapshot in first so the new checkpoint
        // subsumes it.
        if let Some(reference) = candidate.reference {
            self.merge_candidate_snapshot(&reference).await?;
        }

        let (upload_bytes, next_generation, elected) = {
            let mut state = self.state.write().await;
            let users = state.registry.snapshot();
            state.history.update_local(&users);
            state.history.trim();
            let bytes = state.history.to_upload_bytes()?;
            let elected = state.registry.pick_random_updater(self.address);
            (bytes, candidate.generation + 1, elected)
        };

        let reference = retry(
            "upload checkpoint snapshot",
            self.config.retry_attempts,
            self.config.retry_delay,
            || self.storage.upload_object(upload_bytes.clone()),
        )
        .await?;

        let entry = CheckpointEntry {
            generation: next_generation,
            reference: Some(reference),
            updater: elected,
            timestamp: unix_millis(),
        };
        let payload = serde_json::to_vec(&entry)?;

        let params = ConvergenceParams {
            max_retries: self.config.convergence_retries,
            interval: self.config.convergence_interval,
        };
        let sender = Arc::clone(self);
        let checker = Arc::clone(self);
        wait_for_broadcast(
            &params,
            shutdown,
            move || {
                let inner = Arc::clone(&sender);
                let payload = payload.clone();
                async move {
                    inner
                        .bus
                        .send(&inner.chat_topic, UPDATER_RESOURCE, payload)
                        .await
                }
            },
            move || {
                let inner = Arc::clone(&checker);
                async move { inner.state.read().await.history.generation() >= next_generation }
            },
        )
        .await?;

        self.coordinator.mark_published(&candidate).await;
        info!(
            generation = next_generation,
            next_updater = %elected,
            "published history checkpoint"
        );
        self.emit(SessionEvent::CheckpointPublished {
            generation: next_generation,
        });
        Ok(())
    }

    /// Download and merge the snapshot a candidate points at.
    ///
    /// A validation failure bans the reference immediately and the
    /// publication proceeds without its contribution. A transient
    /// failure with retry budget left aborts this round so the next tick
    /// tries again; once banned, the chain advances without it.
    async fn merge_candidate_snapshot(&self, reference: &ObjectRef) -> Result<()> {
        let should = { self.state.read().await.ledger.should_process(reference) };
        if !should {
            return Ok(());
        }

        let downloaded = retry(
            "download candidate snapshot",
            self.config.retry_attempts,
            self.config.retry_delay,
            || self.storage.download_object(reference),
        )
        .await;

        match downloaded {
            Ok(bytes) => match validate::parse_snapshot(&bytes) {
                Ok(remote) => {
                    let mut state = self.state.write().await;
                    state.history.merge_remote(remote);
                    state.ledger.mark_success(reference);
                    Ok(())
                }
                Err(err) => {
                    warn!(%reference, %err, "candidate snapshot failed validation");
                    self.state.write().await.ledger.mark_invalid(reference);
                    Ok(())
                }
            },
            Err(err) => {
                debug!(%reference, %err, "candidate snapshot download failed");
                let banned = self.state.write().await.ledger.mark_failure(reference);
                if banned {
                    Ok(())
                } else {
                    Err(err.into())
                }
            }
        }
    }

    // ---- send / previous --------------------------------------------------

    async fn try_send(
        &self,
        id: MessageId,
        text: String,
        kind: MessageKind,
        target_id: Option<MessageId>,
    ) -> Result<()> {
        if let Some(expected) = self.config.address {
            let actual = self.signer.address();
            if expected != actual {
                return Err(Error::IdentityMismatch { expected, actual });
            }
        }
        if self.runtime.lock().await.is_none() {
            return Err(Error::NotStarted);
        }

        let _guard = self.send_lock.lock().await;

        let index = {
            let state = self.state.read().await;
            state.own_index.map(|i| i + 1).unwrap_or(0)
        };

        let mut msg = Message {
            id,
            kind,
            target_id,
            text,
            address: self.address,
            username: self.config.username.clone(),
            timestamp: unix_millis(),
            index,
            chat_topic: self.chat_topic,
            user_topic: self.user_topic,
            public_key: self.signer.public_key().to_vec(),
            signature: vec![],
        };
        msg.signature = self.signer.sign(&msg.signable_bytes());

        let object = serde_json::to_vec(&msg)?;
        let reference = retry(
            "upload message",
            self.config.retry_attempts,
            self.config.retry_delay,
            || self.storage.upload_object(object.clone()),
        )
        .await?;

        let feed_payload = serde_json::to_vec(&reference)?;
        retry(
            "write feed entry",
            self.config.retry_attempts,
            self.config.retry_delay,
            || {
                self.storage
                    .write_feed_entry(&self.chat_topic, &self.address, index, feed_payload.clone())
            },
        )
        .await?;

        // Stopped while the write was in flight: discard the result.
        if self.runtime.lock().await.is_none() {
            return Err(Error::Cancelled);
        }

        {
            let mut state = self.state.write().await;
            state.own_index = Some(index);
            // Own messages are emitted locally below, never re-fetched.
            state.ledger.mark_success(&reference);
        }

        if let Err(err) = self.announce_self().await {
            debug!(%err, "post-send announcement failed");
        }

        self.emit(SessionEvent::MessageReceived(msg));
        Ok(())
    }

    async fn load_previous(&self) -> Result<Vec<Message>> {
        if self.runtime.lock().await.is_none() {
            return Err(Error::NotStarted);
        }

        let selected = { self.state.write().await.history.select_latest_messages() };

        let mut messages = Vec::new();
        for (address, entry) in selected {
            match self.resolve_feed_entry(&address, entry.index).await {
                Ok(Resolution::Message(msg)) => messages.push(*msg),
                Ok(_) => {}
                Err(err) => {
                    debug!(%address, index = entry.index, %err, "previous message unavailable");
                }
            }
        }
        messages.sort_by_key(|m| (m.timestamp, m.index));
        Ok(messages)
    }
}
