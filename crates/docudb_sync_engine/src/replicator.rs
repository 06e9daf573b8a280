//! The replicator: keeps a local database and a peer in sync.
//!
//! A started replicator owns one background thread. The thread performs
//! the handshake, then runs passes until it has caught up:
//!
//! 1. **Discover.** Read a batch of local changes after the push checkpoint
//!    and ask the peer which revisions it lacks (`revs_diff`). Read a batch
//!    of the peer's changes after the pull checkpoint and ask the local
//!    database the same question.
//! 2. **Transfer.** Push the missing local revisions; fetch the missing
//!    remote ones and apply them with
//!    [`Database::apply_remote_revision`](docudb_core::Database::apply_remote_revision).
//! 3. **Checkpoint.** Persist both sequences in the local database.
//!
//! Continuous replicators then wait for a change on either side, or poll a
//! peer that cannot notify. Retryable errors take a continuous replicator
//! offline, and it reconnects after a backoff. One-shot replicators stop
//! after the first clean pass or the first error.
//!
//! Every status change is published through a
//! [`ListenerRegistry`](docudb_core::notify::ListenerRegistry), so
//! listeners observe transitions in the order they happened.

use crate::config::{Endpoint, ReplicatorConfiguration};
use crate::error::{SyncError, SyncResult};
use crate::http::RemotePeer;
use crate::peer::{
    parse_revision, payload_to_record, record_to_payload, LocalPeer, ReplicationPeer,
};
use crate::state::{ActivityEvent, ActivityLevel, ReplicatorStatus};
use docudb_core::notify::ListenerRegistry;
use docudb_core::{
    CoreError, Database, Executor, InlineExecutor, ListenerToken, RevisionRecord, SerialExecutor,
};
use docudb_sync_protocol::{
    ChangesRequest, FetchRequest, HandshakeRequest, PushRequest, RevisionRef, RevsDiffRequest,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Wake-ups delivered to the worker thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    LocalChange,
    RemoteChange,
    Stop,
}

struct Running {
    signals: Sender<Signal>,
    handle: JoinHandle<()>,
}

struct Inner {
    config: ReplicatorConfiguration,
    peer: Arc<dyn ReplicationPeer>,
    status: Mutex<ReplicatorStatus>,
    listeners: ListenerRegistry<ReplicatorStatus>,
    notifier: Arc<SerialExecutor>,
    control: Mutex<Option<Running>>,
    stopping: AtomicBool,
    reset_checkpoint: AtomicBool,
}

impl Inner {
    /// Applies `event` (if any) and `edit`, then posts the new snapshot.
    ///
    /// The snapshot is queued under the status lock and delivered after it
    /// is released, so listeners see snapshots in transition order and may
    /// read [`Replicator::status`] from any executor.
    fn publish(
        &self,
        event: Option<ActivityEvent>,
        edit: impl FnOnce(&mut ReplicatorStatus),
    ) -> SyncResult<()> {
        let mut status = self.status.lock();
        if let Some(event) = event {
            let next = status.activity.on(event)?;
            if next != status.activity {
                debug!(
                    database = %self.config.database.name(),
                    from = %status.activity,
                    to = %next,
                    "replicator activity"
                );
            }
            status.activity = next;
        }
        edit(&mut status);
        self.listeners.enqueue(status.clone());
        drop(status);
        self.listeners.flush();
        Ok(())
    }

    fn activity(&self) -> ActivityLevel {
        self.status.lock().activity
    }

    fn check_stopping(&self) -> SyncResult<()> {
        if self.stopping.load(Ordering::Acquire) {
            Err(SyncError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Synchronizes a local database with one peer.
///
/// # Example
///
/// ```
/// use docudb_core::{Database, Document};
/// use docudb_sync_engine::{Endpoint, Replicator, ReplicatorConfiguration};
/// use std::sync::Arc;
///
/// let local = Arc::new(Database::open_in_memory("local").unwrap());
/// let other = Arc::new(Database::open_in_memory("other").unwrap());
/// local.save(&Document::with_id("a")).unwrap();
///
/// let config = ReplicatorConfiguration::new(local, Endpoint::Database(other.clone()));
/// let replicator = Replicator::new(config).unwrap();
/// replicator.start().unwrap();
/// while replicator.status().activity.is_running() {
///     std::thread::sleep(std::time::Duration::from_millis(5));
/// }
/// assert_eq!(other.count(), 1);
/// ```
pub struct Replicator {
    inner: Arc<Inner>,
}

impl Replicator {
    /// Creates a stopped replicator.
    ///
    /// # Errors
    ///
    /// Returns an error if the endpoint is the local database itself or the
    /// notification thread cannot be spawned.
    pub fn new(config: ReplicatorConfiguration) -> SyncResult<Self> {
        let peer: Arc<dyn ReplicationPeer> = match &config.endpoint {
            Endpoint::Database(target) => {
                if Arc::ptr_eq(target, &config.database) {
                    return Err(CoreError::invalid_operation(
                        "cannot replicate a database with itself",
                    )
                    .into());
                }
                Arc::new(LocalPeer::new(Arc::clone(target)))
            }
            Endpoint::Remote { url, client } => {
                Arc::new(RemotePeer::new(url.clone(), Arc::clone(client)))
            }
            Endpoint::Peer(peer) => Arc::clone(peer),
        };
        let notifier = SerialExecutor::new(format!(
            "docudb-repl-notify-{}",
            config.database.name()
        ))
        .map_err(CoreError::from)?;

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                peer,
                status: Mutex::new(ReplicatorStatus::stopped()),
                listeners: ListenerRegistry::new(),
                notifier: Arc::new(notifier),
                control: Mutex::new(None),
                stopping: AtomicBool::new(false),
                reset_checkpoint: AtomicBool::new(false),
            }),
        })
    }

    /// The configuration.
    pub fn config(&self) -> &ReplicatorConfiguration {
        &self.inner.config
    }

    /// Current status snapshot.
    pub fn status(&self) -> ReplicatorStatus {
        self.inner.status.lock().clone()
    }

    /// Starts replicating in the background.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] if the replicator is
    /// already running; the running session is not affected.
    pub fn start(&self) -> SyncResult<()> {
        let mut control = self.inner.control.lock();
        // Fails unless stopped.
        self.inner.activity().on(ActivityEvent::Start)?;

        if let Some(previous) = control.take() {
            // Already posted `stopped`; the thread is on its way out.
            let _ = previous.handle.join();
        }

        self.inner.stopping.store(false, Ordering::Release);
        self.inner.publish(Some(ActivityEvent::Start), |status| {
            status.progress = Default::default();
            status.error = None;
        })?;

        let (tx, rx) = mpsc::channel();
        let worker = Worker::new(Arc::clone(&self.inner), tx.clone(), rx);
        let spawned = thread::Builder::new()
            .name(format!("docudb-repl-{}", self.inner.config.database.name()))
            .spawn(move || worker.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                self.inner.publish(Some(ActivityEvent::Stop), |_| {})?;
                return Err(CoreError::from(e).into());
            }
        };

        info!(
            database = %self.inner.config.database.name(),
            endpoint = ?self.inner.config.endpoint,
            replicator_type = ?self.inner.config.replicator_type,
            continuous = self.inner.config.continuous,
            "replicator started"
        );
        *control = Some(Running {
            signals: tx,
            handle,
        });
        Ok(())
    }

    /// Requests a stop and returns immediately.
    ///
    /// Completion is reported by a `stopped` status. Stopping a stopped
    /// replicator does nothing.
    pub fn stop(&self) {
        let control = self.inner.control.lock();
        if let Some(running) = control.as_ref() {
            if !self.inner.stopping.swap(true, Ordering::AcqRel) {
                let _ = running.signals.send(Signal::Stop);
            }
        }
    }

    /// Forgets the stored checkpoint so the next start re-scans both sides.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::InvalidStateTransition`] while running.
    pub fn reset_checkpoint(&self) -> SyncResult<()> {
        let activity = self.inner.activity();
        if activity.is_running() {
            return Err(SyncError::InvalidStateTransition {
                from: activity.to_string(),
                to: "reset-checkpoint".into(),
            });
        }
        self.inner.reset_checkpoint.store(true, Ordering::Release);
        Ok(())
    }

    /// Registers a status listener on the replicator's notification thread.
    pub fn add_change_listener(
        &self,
        listener: impl Fn(&ReplicatorStatus) + Send + Sync + 'static,
    ) -> ListenerToken {
        let executor: Arc<dyn Executor> = self.inner.notifier.clone();
        self.inner.listeners.add(executor, listener)
    }

    /// Registers a status listener that runs on `executor`.
    pub fn add_change_listener_with_executor(
        &self,
        executor: Arc<dyn Executor>,
        listener: impl Fn(&ReplicatorStatus) + Send + Sync + 'static,
    ) -> ListenerToken {
        self.inner.listeners.add(executor, listener)
    }

    /// Unregisters a status listener. Returns false if the token is unknown.
    pub fn remove_change_listener(&self, token: ListenerToken) -> bool {
        self.inner.listeners.remove(token)
    }
}

impl Drop for Replicator {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for Replicator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Replicator")
            .field("database", &self.inner.config.database.name())
            .field("endpoint", &self.inner.config.endpoint)
            .field("status", &self.status())
            .finish()
    }
}

/// Checkpoint value: push sequence then pull sequence, little-endian.
fn encode_checkpoint(push: u64, pull: u64) -> [u8; 16] {
    let mut bytes = [0u8; 16];
    bytes[..8].copy_from_slice(&push.to_le_bytes());
    bytes[8..].copy_from_slice(&pull.to_le_bytes());
    bytes
}

/// Marks unfinished work as done. It is rediscovered after reconnecting.
fn abandon_work(status: &mut ReplicatorStatus) {
    status.progress.completed = status.progress.total;
}

/// Lowers `floor` to just below `failed`.
fn lower_floor(floor: &mut Option<u64>, failed: u64) {
    let below = failed.saturating_sub(1);
    *floor = Some(floor.map_or(below, |current| current.min(below)));
}

fn decode_checkpoint(bytes: &[u8]) -> Option<(u64, u64)> {
    let push: [u8; 8] = bytes.get(..8)?.try_into().ok()?;
    let pull: [u8; 8] = bytes.get(8..16)?.try_into().ok()?;
    Some((u64::from_le_bytes(push), u64::from_le_bytes(pull)))
}

/// Local revisions the peer lacks.
struct PushBatch {
    records: Vec<RevisionRecord>,
    next_since: u64,
    has_more: bool,
}

/// Peer documents whose current revision is unknown locally, with the
/// peer sequence each was listed at.
struct PullBatch {
    doc_ids: Vec<(String, u64)>,
    next_since: u64,
    has_more: bool,
}

/// State owned by the background thread.
struct Worker {
    inner: Arc<Inner>,
    tx: Sender<Signal>,
    signals: Receiver<Signal>,
    session: String,
    batch_size: u32,
    checkpoint_key: Option<String>,
    push_since: u64,
    pull_since: u64,
    /// Highest sequences that are safe to persist this session. A revision
    /// the peer rejected, or a pulled one that could not be applied, holds
    /// the stored checkpoint below it so the next session retries it.
    push_floor: Option<u64>,
    pull_floor: Option<u64>,
    failures: u32,
    remote_watched: bool,
}

impl Worker {
    fn new(inner: Arc<Inner>, tx: Sender<Signal>, signals: Receiver<Signal>) -> Self {
        let batch_size = inner.config.batch_size;
        Self {
            inner,
            tx,
            signals,
            session: String::new(),
            batch_size,
            checkpoint_key: None,
            push_since: 0,
            pull_since: 0,
            push_floor: None,
            pull_floor: None,
            failures: 0,
            remote_watched: false,
        }
    }

    fn database(&self) -> &Arc<Database> {
        &self.inner.config.database
    }

    fn run(mut self) {
        let local_token = {
            let tx = self.tx.clone();
            let executor: Arc<dyn Executor> = Arc::new(InlineExecutor);
            self.database()
                .add_change_listener_with_executor(executor, move |_| {
                    let _ = tx.send(Signal::LocalChange);
                })
        };
        let remote_token = if self.inner.config.continuous {
            let tx = self.tx.clone();
            self.inner.peer.watch(Box::new(move || {
                let _ = tx.send(Signal::RemoteChange);
            }))
        } else {
            None
        };
        self.remote_watched = remote_token.is_some();

        let outcome = self.run_session();

        self.database().remove_change_listener(local_token);
        if let Some(token) = remote_token {
            self.inner.peer.unwatch(token);
        }

        let database = self.database().name().to_string();
        let fatal = match outcome {
            Ok(()) => {
                info!(database = %database, "replicator stopped");
                None
            }
            Err(e) => {
                warn!(database = %database, error = %e, "replicator stopped with error");
                Some(e)
            }
        };
        let _ = self.inner.publish(Some(ActivityEvent::Stop), |status| {
            abandon_work(status);
            if let Some(error) = fatal {
                status.error = Some(error);
            }
        });
    }

    /// Connects and syncs until stopped, retrying retryable failures in
    /// continuous mode.
    fn run_session(&mut self) -> Result<(), Arc<SyncError>> {
        loop {
            let error = match self.connect_and_sync() {
                Ok(()) | Err(SyncError::Cancelled) => return Ok(()),
                Err(e) => Arc::new(e),
            };
            if !self.inner.config.continuous || !error.is_retryable() {
                return Err(error);
            }

            self.failures += 1;
            warn!(
                database = %self.database().name(),
                error = %error,
                attempt = self.failures,
                "replicator offline"
            );
            let lost = Arc::clone(&error);
            self.inner
                .publish(Some(ActivityEvent::NetworkLost), |status| {
                    abandon_work(status);
                    status.error = Some(lost);
                })
                .map_err(Arc::new)?;
            if self.inner.config.retry.exhausted(self.failures) {
                return Err(error);
            }

            let delay = self.inner.config.retry.delay_for_attempt(self.failures);
            if self.backoff(delay).is_err() {
                return Ok(());
            }
            debug!(database = %self.database().name(), ?delay, "replicator retrying");
            self.inner
                .publish(Some(ActivityEvent::Retry), |_| {})
                .map_err(Arc::new)?;
        }
    }

    fn connect_and_sync(&mut self) -> SyncResult<()> {
        self.inner.check_stopping()?;
        self.handshake()?;
        self.failures = 0;

        let mut first = true;
        loop {
            self.sync_pass(&mut first)?;
            if !self.inner.config.continuous {
                return Ok(());
            }
            self.wait_for_work()?;
        }
    }

    fn handshake(&mut self) -> SyncResult<()> {
        let db = Arc::clone(self.database());
        let mut request = HandshakeRequest::new(db.uuid(), db.name());
        if let Some(token) = &self.inner.config.auth_token {
            request = request.with_token(token.clone());
        }
        let response = self.inner.peer.handshake(&request)?;
        self.session = response
            .session
            .ok_or_else(|| SyncError::Protocol("handshake response has no session".into()))?;
        // Never send the peer more than it said it accepts.
        self.batch_size = match response.max_batch {
            Some(max) => self.inner.config.batch_size.min(max.max(1)),
            None => self.inner.config.batch_size,
        };

        let key = format!("replicator/{}/{}", db.uuid(), response.peer_uuid);
        if self.inner.reset_checkpoint.swap(false, Ordering::AcqRel) {
            db.delete_checkpoint(&key)?;
        }
        let (push, pull) = db
            .get_checkpoint(&key)
            .as_deref()
            .and_then(decode_checkpoint)
            .unwrap_or((0, 0));
        debug!(
            database = %db.name(),
            peer = %response.peer_uuid,
            push_since = push,
            pull_since = pull,
            batch_size = self.batch_size,
            "replicator connected"
        );
        self.push_since = push;
        self.pull_since = pull;
        self.push_floor = None;
        self.pull_floor = None;
        self.checkpoint_key = Some(key);
        Ok(())
    }

    /// Transfers batches until neither side reports more work.
    fn sync_pass(&mut self, first: &mut bool) -> SyncResult<()> {
        let config = &self.inner.config;
        let (pushes, pulls) = (config.replicator_type.pushes(), config.replicator_type.pulls());
        loop {
            self.inner.check_stopping()?;
            let push = if pushes {
                self.discover_push()?
            } else {
                PushBatch {
                    records: Vec::new(),
                    next_since: self.push_since,
                    has_more: false,
                }
            };
            let pull = if pulls {
                self.discover_pull()?
            } else {
                PullBatch {
                    doc_ids: Vec::new(),
                    next_since: self.pull_since,
                    has_more: false,
                }
            };

            let units = (push.records.len() + pull.doc_ids.len()) as u64;
            if units > 0 {
                let event = if *first {
                    ActivityEvent::Connected { pending: true }
                } else {
                    ActivityEvent::WorkQueued
                };
                *first = false;
                self.inner.publish(Some(event), |status| {
                    status.error = None;
                    status.progress.total += units;
                })?;
            }

            if !push.records.is_empty() {
                if let Some(sequence) = self.transfer_push(&push.records)? {
                    lower_floor(&mut self.push_floor, sequence);
                }
                let pushed = push.records.len() as u64;
                let mut status = self.inner.status.lock();
                status.progress.completed += pushed;
                if !status.progress.is_complete() {
                    drop(status);
                    self.inner.publish(None, |_| {})?;
                }
            }
            self.inner.check_stopping()?;
            if !pull.doc_ids.is_empty() {
                if let Some(sequence) = self.transfer_pull(&pull.doc_ids)? {
                    lower_floor(&mut self.pull_floor, sequence);
                }
                self.inner.status.lock().progress.completed += pull.doc_ids.len() as u64;
            }

            self.save_checkpoint(push.next_since, pull.next_since)?;
            if !push.has_more && !pull.has_more {
                break;
            }
        }

        if *first {
            *first = false;
            self.inner
                .publish(Some(ActivityEvent::Connected { pending: false }), |status| {
                    status.error = None;
                })?;
        } else if self.inner.activity() == ActivityLevel::Busy {
            self.inner.publish(Some(ActivityEvent::CaughtUp), |_| {})?;
        }
        Ok(())
    }

    fn discover_push(&self) -> SyncResult<PushBatch> {
        let limit = self.batch_size as usize;
        let mut records = self.database().changes_since(self.push_since, limit + 1)?;
        let has_more = records.len() > limit;
        records.truncate(limit);
        let next_since = records.last().map_or(self.push_since, |r| r.sequence);
        if records.is_empty() {
            return Ok(PushBatch {
                records,
                next_since,
                has_more,
            });
        }

        let offered = records
            .iter()
            .map(|r| RevisionRef::new(r.doc_id.clone(), r.revision.to_string()))
            .collect();
        let diff = self.inner.peer.revs_diff(&RevsDiffRequest {
            session: self.session.clone(),
            revisions: offered,
        })?;
        let missing: HashSet<RevisionRef> = diff.missing.into_iter().collect();
        records.retain(|r| {
            missing.contains(&RevisionRef::new(r.doc_id.clone(), r.revision.to_string()))
        });

        Ok(PushBatch {
            records,
            next_since,
            has_more,
        })
    }

    fn discover_pull(&self) -> SyncResult<PullBatch> {
        let response = self.inner.peer.changes(&ChangesRequest::new(
            self.session.clone(),
            self.pull_since,
            self.batch_size,
        ))?;
        let offered = response
            .changes
            .iter()
            .map(|c| -> SyncResult<_> { Ok((c.doc_id.clone(), parse_revision(&c.rev)?)) })
            .collect::<SyncResult<Vec<_>>>()?;
        let listed: HashMap<&str, u64> = response
            .changes
            .iter()
            .map(|c| (c.doc_id.as_str(), c.sequence))
            .collect();
        let doc_ids = self
            .database()
            .revs_diff(&offered)?
            .into_iter()
            .map(|(doc_id, _)| {
                let sequence = listed
                    .get(doc_id.as_str())
                    .copied()
                    .unwrap_or(response.last_sequence);
                (doc_id, sequence)
            })
            .collect();
        Ok(PullBatch {
            doc_ids,
            next_since: response.last_sequence.max(self.pull_since),
            has_more: response.has_more,
        })
    }

    /// Pushes `records`. Returns the lowest local sequence the peer
    /// rejected, if any.
    fn transfer_push(&self, records: &[RevisionRecord]) -> SyncResult<Option<u64>> {
        let response = self.inner.peer.push(&PushRequest {
            session: self.session.clone(),
            revisions: records.iter().map(record_to_payload).collect(),
        })?;
        for rejection in &response.rejected {
            warn!(
                doc_id = %rejection.doc_id,
                rev = %rejection.rev,
                reason = %rejection.reason,
                "peer rejected revision"
            );
        }
        debug!(accepted = response.accepted, rejected = response.rejected.len(), "pushed");
        let lowest = response
            .rejected
            .iter()
            .filter_map(|rejection| {
                records
                    .iter()
                    .find(|r| {
                        r.doc_id == rejection.doc_id && r.revision.to_string() == rejection.rev
                    })
                    .map(|r| r.sequence)
            })
            .min();
        Ok(lowest)
    }

    /// Fetches and applies the current revision of each document. Returns
    /// the lowest peer sequence whose revision was skipped, if any.
    fn transfer_pull(&self, doc_ids: &[(String, u64)]) -> SyncResult<Option<u64>> {
        let response = self.inner.peer.fetch(&FetchRequest {
            session: self.session.clone(),
            doc_ids: doc_ids.iter().map(|(doc_id, _)| doc_id.clone()).collect(),
        })?;
        let listed_at = |doc_id: &str| {
            doc_ids
                .iter()
                .find(|(id, _)| id == doc_id)
                .map(|(_, sequence)| *sequence)
        };
        let db = self.database();
        let mut skipped = Vec::new();
        for payload in &response.revisions {
            let record = match payload.validate() {
                Ok(()) => payload_to_record(payload)?,
                Err(e) => {
                    warn!(doc_id = %payload.doc_id, error = %e, "skipping malformed revision");
                    skipped.extend(listed_at(&payload.doc_id));
                    continue;
                }
            };
            match db.apply_remote_revision(record) {
                Ok(outcome) => {
                    debug!(doc_id = %payload.doc_id, rev = %payload.rev, ?outcome, "pulled");
                }
                Err(e @ CoreError::Validation { .. }) => {
                    warn!(doc_id = %payload.doc_id, error = %e, "skipping invalid revision");
                    skipped.extend(listed_at(&payload.doc_id));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(skipped.into_iter().min())
    }

    /// Advances the session cursors and persists them, held below any
    /// revision that failed this session.
    fn save_checkpoint(&mut self, push: u64, pull: u64) -> SyncResult<()> {
        if push == self.push_since && pull == self.pull_since {
            return Ok(());
        }
        let stored_push = self.push_floor.map_or(push, |floor| floor.min(push));
        let stored_pull = self.pull_floor.map_or(pull, |floor| floor.min(pull));
        if let Some(key) = &self.checkpoint_key {
            self.database()
                .put_checkpoint(key, &encode_checkpoint(stored_push, stored_pull))?;
        }
        self.push_since = push;
        self.pull_since = pull;
        Ok(())
    }

    /// Blocks until either side changes. Peers that cannot notify are
    /// polled every `poll_interval`.
    fn wait_for_work(&self) -> SyncResult<()> {
        let first = if self.remote_watched {
            self.signals.recv().map_err(|_| SyncError::Cancelled)?
        } else {
            match self.signals.recv_timeout(self.inner.config.poll_interval) {
                Ok(signal) => signal,
                Err(RecvTimeoutError::Timeout) => return Ok(()),
                Err(RecvTimeoutError::Disconnected) => return Err(SyncError::Cancelled),
            }
        };
        if first == Signal::Stop {
            return Err(SyncError::Cancelled);
        }
        // Coalesce a burst of changes into one pass.
        while let Ok(signal) = self.signals.try_recv() {
            if signal == Signal::Stop {
                return Err(SyncError::Cancelled);
            }
        }
        self.inner.check_stopping()
    }

    /// Sleeps for `delay` unless a stop arrives first.
    fn backoff(&self, delay: Duration) -> SyncResult<()> {
        let deadline = Instant::now() + delay;
        loop {
            self.inner.check_stopping()?;
            let left = deadline.saturating_duration_since(Instant::now());
            if left.is_zero() {
                return Ok(());
            }
            match self.signals.recv_timeout(left) {
                Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    return Err(SyncError::Cancelled)
                }
                Ok(_) => {}
                Err(RecvTimeoutError::Timeout) => return Ok(()),
            }
        }
    }
}
