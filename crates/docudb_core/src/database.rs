//! Database facade and recovery.

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeOrigin};
use crate::config::DatabaseConfig;
use crate::dir::DatabaseDir;
use crate::document::Document;
use crate::error::{CoreError, CoreResult};
use crate::journal::{Journal, JournalRecord};
use crate::merge::{resolve, ApplyOutcome, Resolution};
use crate::notify::{Executor, ListenerRegistry, ListenerToken, SerialExecutor};
use crate::revision::{extend_history, RevisionId};
use crate::store::{encode_body, DocumentIndex, RevisionRecord};
use crate::value::Dictionary;
use docudb_storage::{FileBackend, InMemoryBackend, StorageBackend};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{debug, info};

/// How a save treats a document whose base revision is no longer current.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConcurrencyControl {
    /// Commit on top of whatever revision is current.
    #[default]
    LastWriteWins,
    /// Fail with [`CoreError::Conflict`].
    FailOnConflict,
}

/// Outcome of [`Database::compact`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactionStats {
    /// Journal size before compaction.
    pub bytes_before: u64,
    /// Journal size after compaction.
    pub bytes_after: u64,
    /// Revision records kept (live documents and tombstones).
    pub records: usize,
}

/// The main database handle.
///
/// `Database` is the storage engine: it maps document ids to their latest
/// revision, persists every commit to an append-only journal before
/// making it visible, and publishes one [`ChangeEvent`] per commit.
///
/// All methods take `&self`; share a database between threads with
/// `Arc<Database>`. Commits are serialized through a single writer lock
/// while reads only take the index read lock, so a reader observes a
/// document either before or after a concurrent save, never in between.
///
/// # Example
///
/// ```rust
/// use docudb_core::{Database, Document};
///
/// let db = Database::open_in_memory("people").unwrap();
/// let doc = Document::with_id("ada");
/// doc.set("name", "Ada");
/// db.save(&doc).unwrap();
///
/// let loaded = db.get_document("ada").unwrap().unwrap();
/// assert_eq!(loaded.get_string("name").as_deref(), Some("Ada"));
/// assert_eq!(db.count(), 1);
/// ```
pub struct Database {
    name: String,
    uuid: String,
    config: DatabaseConfig,
    /// Directory lock; `None` for in-memory databases and after close.
    dir: Mutex<Option<DatabaseDir>>,
    journal: Journal,
    index: RwLock<DocumentIndex>,
    checkpoints: RwLock<HashMap<String, Vec<u8>>>,
    /// Single writer admission point.
    write_lock: Mutex<()>,
    last_sequence: AtomicU64,
    feed: ChangeFeed,
    listeners: ListenerRegistry<ChangeEvent>,
    notifier: Arc<SerialExecutor>,
    closed: AtomicBool,
}

impl Database {
    /// Opens database `name`.
    ///
    /// With `config.directory` set the database lives in
    /// `<directory>/<name>.docudb/`; otherwise it is kept in memory.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - the name is empty or contains a path separator
    /// - another handle has the database locked (`DatabaseLocked`)
    /// - the database is missing and `create_if_missing` is false
    /// - the journal is corrupt
    pub fn open(name: &str, config: DatabaseConfig) -> CoreResult<Self> {
        validate_name(name)?;
        let Some(parent) = config.directory.clone() else {
            return Self::open_with_backend(name, config, Box::new(InMemoryBackend::new()));
        };

        let dir = DatabaseDir::open(&parent, name, config.create_if_missing)?;
        let backend = FileBackend::open(&dir.journal_path())?;
        Self::recover(name, config, Some(dir), Box::new(backend))
    }

    /// Opens an empty in-memory database.
    ///
    /// # Errors
    ///
    /// Returns an error if `name` is invalid.
    pub fn open_in_memory(name: &str) -> CoreResult<Self> {
        Self::open_with_backend(name, DatabaseConfig::default(), Box::new(InMemoryBackend::new()))
    }

    /// Opens a database over an arbitrary journal backend.
    ///
    /// `config.directory` is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend holds a corrupt journal.
    pub fn open_with_backend(
        name: &str,
        config: DatabaseConfig,
        backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        validate_name(name)?;
        Self::recover(name, config, None, backend)
    }

    fn recover(
        name: &str,
        config: DatabaseConfig,
        dir: Option<DatabaseDir>,
        backend: Box<dyn StorageBackend>,
    ) -> CoreResult<Self> {
        let journal = Journal::new(backend, config.sync_on_commit);
        let replay = journal.recover()?;

        let mut index = DocumentIndex::default();
        let mut checkpoints = HashMap::new();
        let mut uuid = None;
        let mut last_sequence = 0;
        for (_, record) in replay.records {
            match record {
                JournalRecord::Header { uuid: stored, .. } => {
                    uuid.get_or_insert(stored);
                }
                JournalRecord::Revision(revision) => {
                    last_sequence = last_sequence.max(revision.sequence);
                    index.install(revision);
                }
                JournalRecord::Checkpoint { key, value: Some(value) } => {
                    checkpoints.insert(key, value);
                }
                JournalRecord::Checkpoint { key, value: None } => {
                    checkpoints.remove(&key);
                }
            }
        }

        let uuid = match uuid {
            Some(uuid) => uuid,
            None => {
                let uuid = uuid::Uuid::new_v4().to_string();
                journal.append(&JournalRecord::Header {
                    uuid: uuid.clone(),
                    name: name.to_string(),
                })?;
                uuid
            }
        };

        info!(
            database = name,
            %uuid,
            documents = index.live_count(),
            last_sequence,
            discarded_bytes = replay.discarded_bytes,
            "database opened"
        );

        let notifier = Arc::new(SerialExecutor::new(format!("docudb-notify-{name}"))?);
        Ok(Self {
            name: name.to_string(),
            uuid,
            feed: ChangeFeed::with_max_history(config.feed_history),
            config,
            dir: Mutex::new(dir),
            journal,
            index: RwLock::new(index),
            checkpoints: RwLock::new(checkpoints),
            write_lock: Mutex::new(()),
            last_sequence: AtomicU64::new(last_sequence),
            listeners: ListenerRegistry::new(),
            notifier,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns true if an on-disk database `name` exists under `directory`.
    pub fn exists(name: &str, directory: impl AsRef<Path>) -> bool {
        DatabaseDir::exists(directory.as_ref(), name)
    }

    /// Deletes the on-disk database `name` under `directory`.
    ///
    /// # Errors
    ///
    /// Fails with `DatabaseLocked` while a handle has it open.
    pub fn delete_database(name: &str, directory: impl AsRef<Path>) -> CoreResult<()> {
        DatabaseDir::remove(directory.as_ref(), name)?;
        info!(database = name, "database deleted");
        Ok(())
    }

    /// The database name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stable identifier, persisted with the journal.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    /// The configuration this database was opened with.
    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    /// On-disk directory, if any.
    pub fn path(&self) -> Option<PathBuf> {
        self.dir.lock().as_ref().map(|d| d.path().to_path_buf())
    }

    // ---------------------------------------------------------------
    // Reads
    // ---------------------------------------------------------------

    /// Loads the latest revision of `id`.
    ///
    /// Returns `Ok(None)` for unknown and deleted documents. The returned
    /// document is a fresh handle; edits to it stay local until saved.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed or the stored body
    /// cannot be decoded.
    pub fn get_document(&self, id: &str) -> CoreResult<Option<Document>> {
        self.ensure_open()?;
        let Some(record) = self.index.read().get(id) else {
            return Ok(None);
        };
        if record.deleted {
            return Ok(None);
        }
        let body = record.decode_body()?;
        Ok(Some(Document::loaded(
            id,
            body,
            record.revision.clone(),
            record.sequence,
        )))
    }

    /// Number of documents that are not deleted.
    pub fn count(&self) -> u64 {
        self.index.read().live_count()
    }

    /// Sequence of the most recent commit, 0 for an empty database.
    pub fn last_sequence(&self) -> u64 {
        self.last_sequence.load(Ordering::Acquire)
    }

    /// Latest record of `id`, including tombstones.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed.
    pub fn revision(&self, id: &str) -> CoreResult<Option<RevisionRecord>> {
        self.ensure_open()?;
        Ok(self.index.read().get(id).map(|r| (*r).clone()))
    }

    /// Latest record of every document changed after `since`, in sequence
    /// order, at most `limit` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed.
    pub fn changes_since(&self, since: u64, limit: usize) -> CoreResult<Vec<RevisionRecord>> {
        self.ensure_open()?;
        Ok(self
            .index
            .read()
            .changes_since(since, limit)
            .into_iter()
            .map(|r| (*r).clone())
            .collect())
    }

    /// Ids of every document, deleted ones included, in no particular order.
    pub fn document_ids(&self) -> Vec<String> {
        self.index.read().ids().map(str::to_string).collect()
    }

    /// Filters `refs` down to the revisions this database does not know.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed.
    pub fn revs_diff(&self, refs: &[(String, RevisionId)]) -> CoreResult<Vec<(String, RevisionId)>> {
        self.ensure_open()?;
        let index = self.index.read();
        Ok(refs
            .iter()
            .filter(|(id, rev)| !index.get(id).is_some_and(|current| current.knows(rev)))
            .cloned()
            .collect())
    }

    // ---------------------------------------------------------------
    // Writes
    // ---------------------------------------------------------------

    /// Saves `doc` with last-write-wins concurrency control.
    ///
    /// Blocks until the revision is durable. On success `doc` carries the
    /// new revision id and sequence.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for an invalid id, key or value, and
    /// `SaveFailed` carrying the document id if the commit fails. The
    /// store is unchanged after any error.
    pub fn save(&self, doc: &Document) -> CoreResult<RevisionId> {
        self.save_with_concurrency_control(doc, ConcurrencyControl::LastWriteWins)
    }

    /// Saves `doc`, choosing what happens when its base revision is stale.
    ///
    /// # Errors
    ///
    /// As [`Database::save`], plus `Conflict` under
    /// [`ConcurrencyControl::FailOnConflict`].
    pub fn save_with_concurrency_control(
        &self,
        doc: &Document,
        control: ConcurrencyControl,
    ) -> CoreResult<RevisionId> {
        self.ensure_open()?;
        validate_id(doc.id())?;
        let staged = doc.stage();
        validate_body(&staged.body)?;

        let body = encode_body(&staged.body).map_err(|e| e.while_saving(doc.id()))?;

        let writer = self.write_lock.lock();
        self.ensure_open()?;
        let current = self.index.read().get(doc.id());

        if control == ConcurrencyControl::FailOnConflict {
            let base_is_current = match (&staged.base, current.as_deref()) {
                (None, None) => true,
                (None, Some(existing)) => existing.deleted,
                (Some(_), None) => false,
                (Some(base), Some(existing)) => *base == existing.revision,
            };
            if !base_is_current {
                return Err(CoreError::conflict(doc.id()));
            }
        }

        let record = self.next_record(doc.id(), current.as_deref(), false, body);
        let committed = self
            .commit(record, ChangeOrigin::Local)
            .map_err(|e| e.while_saving(doc.id()))?;
        doc.mark_saved(committed.revision.clone(), committed.sequence, false, staged.edits);
        drop(writer);
        self.listeners.flush();
        Ok(committed.revision.clone())
    }

    /// Deletes `doc` by writing a tombstone, last-write-wins.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if there is no live revision to delete, and
    /// `SaveFailed` if the commit fails.
    pub fn delete(&self, doc: &Document) -> CoreResult<RevisionId> {
        self.delete_with_concurrency_control(doc, ConcurrencyControl::LastWriteWins)
    }

    /// Deletes `doc`, choosing what happens when its base revision is stale.
    ///
    /// # Errors
    ///
    /// As [`Database::delete`], plus `Conflict` under
    /// [`ConcurrencyControl::FailOnConflict`].
    pub fn delete_with_concurrency_control(
        &self,
        doc: &Document,
        control: ConcurrencyControl,
    ) -> CoreResult<RevisionId> {
        self.ensure_open()?;
        let base = doc.revision_id();

        let writer = self.write_lock.lock();
        self.ensure_open()?;
        let current = match self.index.read().get(doc.id()) {
            Some(record) if !record.deleted => record,
            _ => return Err(CoreError::not_found(doc.id())),
        };
        if control == ConcurrencyControl::FailOnConflict && base.as_ref() != Some(&current.revision)
        {
            return Err(CoreError::conflict(doc.id()));
        }

        let record = self.next_record(doc.id(), Some(current.as_ref()), true, Vec::new());
        let committed = self
            .commit(record, ChangeOrigin::Local)
            .map_err(|e| e.while_saving(doc.id()))?;
        doc.mark_saved(committed.revision.clone(), committed.sequence, true, 0);
        drop(writer);
        self.listeners.flush();
        Ok(committed.revision.clone())
    }

    /// Applies a revision received from a replication peer.
    ///
    /// Known revisions are ignored, descendants fast-forward and diverged
    /// branches are merged into a new revision that supersedes both.
    ///
    /// # Errors
    ///
    /// Returns a `Validation` error for an empty document id and
    /// `SaveFailed` if the commit fails.
    pub fn apply_remote_revision(&self, incoming: RevisionRecord) -> CoreResult<ApplyOutcome> {
        self.ensure_open()?;
        validate_id(&incoming.doc_id)?;
        let doc_id = incoming.doc_id.clone();

        let writer = self.write_lock.lock();
        self.ensure_open()?;
        let current = self.index.read().get(&doc_id);
        let (mut record, outcome) =
            match resolve(current.as_deref(), incoming, self.config.max_revision_history) {
                Resolution::Ignore => return Ok(ApplyOutcome::Ignored),
                Resolution::Insert(record) => (record, ApplyOutcome::Inserted),
                Resolution::FastForward(record) => (record, ApplyOutcome::FastForwarded),
                Resolution::Merge(record) => {
                    let revision = record.revision.clone();
                    debug!(doc_id = %doc_id, %revision, "merged conflicting revisions");
                    (record, ApplyOutcome::Merged { revision })
                }
            };
        if record.deleted {
            record.body.clear();
        }
        record.sequence = self.last_sequence() + 1;
        self.commit(record, ChangeOrigin::Remote)
            .map_err(|e| e.while_saving(&doc_id))?;
        drop(writer);
        self.listeners.flush();
        Ok(outcome)
    }

    fn next_record(
        &self,
        doc_id: &str,
        parent: Option<&RevisionRecord>,
        deleted: bool,
        body: Vec<u8>,
    ) -> RevisionRecord {
        let revision = RevisionId::derive(parent.map(|p| &p.revision), deleted, &body);
        let parent_history = parent.map_or(&[][..], |p| p.history.as_slice());
        RevisionRecord {
            doc_id: doc_id.to_string(),
            history: extend_history(&revision, parent_history, self.config.max_revision_history),
            revision,
            deleted,
            body,
            sequence: self.last_sequence() + 1,
        }
    }

    /// Journals, installs and announces `record`. Caller holds `write_lock`.
    ///
    /// Listener delivery is only queued here; the caller flushes it once
    /// `write_lock` is released.
    fn commit(&self, record: RevisionRecord, origin: ChangeOrigin) -> CoreResult<Arc<RevisionRecord>> {
        self.journal.append(&JournalRecord::Revision(record.clone()))?;

        let committed = self.index.write().install(record);
        self.last_sequence.store(committed.sequence, Ordering::Release);
        debug!(
            doc_id = %committed.doc_id,
            revision = %committed.revision,
            sequence = committed.sequence,
            deleted = committed.deleted,
            "committed"
        );

        let event = ChangeEvent {
            sequence: committed.sequence,
            doc_id: committed.doc_id.clone(),
            revision: committed.revision.clone(),
            deleted: committed.deleted,
            origin,
        };
        self.feed.emit(event.clone());
        self.listeners.enqueue(event);
        Ok(committed)
    }

    // ---------------------------------------------------------------
    // Checkpoints
    // ---------------------------------------------------------------

    /// Stores an opaque checkpoint value.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed or the journal write fails.
    pub fn put_checkpoint(&self, key: &str, value: &[u8]) -> CoreResult<()> {
        self.ensure_open()?;
        let _writer = self.write_lock.lock();
        self.ensure_open()?;
        self.journal.append(&JournalRecord::Checkpoint {
            key: key.to_string(),
            value: Some(value.to_vec()),
        })?;
        self.checkpoints
            .write()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    /// Reads a checkpoint value.
    pub fn get_checkpoint(&self, key: &str) -> Option<Vec<u8>> {
        self.checkpoints.read().get(key).cloned()
    }

    /// Removes a checkpoint. Removing an absent key is not an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the database is closed or the journal write fails.
    pub fn delete_checkpoint(&self, key: &str) -> CoreResult<()> {
        self.ensure_open()?;
        let _writer = self.write_lock.lock();
        self.ensure_open()?;
        if !self.checkpoints.read().contains_key(key) {
            return Ok(());
        }
        self.journal.append(&JournalRecord::Checkpoint {
            key: key.to_string(),
            value: None,
        })?;
        self.checkpoints.write().remove(key);
        Ok(())
    }

    // ---------------------------------------------------------------
    // Change notification
    // ---------------------------------------------------------------

    /// Receives every change committed from now on, in commit order.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.feed.subscribe()
    }

    /// Recent changes after `cursor` from the feed history.
    pub fn poll_changes(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.feed.poll(cursor, limit)
    }

    /// Registers a listener on the database's notification thread.
    pub fn add_change_listener(
        &self,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> ListenerToken {
        let executor: Arc<dyn Executor> = self.notifier.clone();
        self.listeners.add(executor, listener)
    }

    /// Registers a listener that runs on `executor`.
    pub fn add_change_listener_with_executor(
        &self,
        executor: Arc<dyn Executor>,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> ListenerToken {
        self.listeners.add(executor, listener)
    }

    /// Registers a listener for changes to one document.
    pub fn add_document_change_listener(
        &self,
        doc_id: &str,
        listener: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> ListenerToken {
        let doc_id = doc_id.to_string();
        self.add_change_listener(move |event| {
            if event.doc_id == doc_id {
                listener(event);
            }
        })
    }

    /// Unregisters a listener. Returns false if the token is unknown.
    pub fn remove_change_listener(&self, token: ListenerToken) -> bool {
        self.listeners.remove(token)
    }

    // ---------------------------------------------------------------
    // Maintenance
    // ---------------------------------------------------------------

    /// Rewrites the journal to hold only the latest record per document.
    ///
    /// # Errors
    ///
    /// Returns an error if the rewrite fails; the previous journal is kept.
    pub fn compact(&self) -> CoreResult<CompactionStats> {
        self.ensure_open()?;
        let _writer = self.write_lock.lock();
        self.ensure_open()?;
        let bytes_before = self.journal.size()?;

        let mut records = vec![JournalRecord::Header {
            uuid: self.uuid.clone(),
            name: self.name.clone(),
        }];
        let revisions = self.index.read().all();
        let kept = revisions.len();
        records.extend(
            revisions
                .into_iter()
                .map(|r| JournalRecord::Revision((*r).clone())),
        );
        records.extend(self.checkpoints.read().iter().map(|(key, value)| {
            JournalRecord::Checkpoint {
                key: key.clone(),
                value: Some(value.clone()),
            }
        }));

        let bytes_after = self.journal.rewrite(&records)?;
        info!(
            database = %self.name,
            bytes_before,
            bytes_after,
            records = kept,
            "journal compacted"
        );
        Ok(CompactionStats {
            bytes_before,
            bytes_after,
            records: kept,
        })
    }

    /// Current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn journal_size(&self) -> CoreResult<u64> {
        self.journal.size()
    }

    /// Flushes the journal and releases the directory lock.
    ///
    /// Later operations fail with `DatabaseClosed`. Closing twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error if the final sync fails.
    pub fn close(&self) -> CoreResult<()> {
        let _writer = self.write_lock.lock();
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let synced = self.journal.sync();
        drop(self.dir.lock().take());
        info!(database = %self.name, "database closed");
        synced
    }

    /// Returns true until [`Database::close`] is called.
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> CoreResult<()> {
        if self.is_open() {
            Ok(())
        } else {
            Err(CoreError::DatabaseClosed)
        }
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("uuid", &self.uuid)
            .field("last_sequence", &self.last_sequence())
            .field("open", &self.is_open())
            .finish()
    }
}

fn validate_name(name: &str) -> CoreResult<()> {
    if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
        return Err(CoreError::validation(format!(
            "invalid database name {name:?}"
        )));
    }
    Ok(())
}

fn validate_id(id: &str) -> CoreResult<()> {
    if id.is_empty() {
        return Err(CoreError::validation("document id must not be empty"));
    }
    Ok(())
}

/// Top-level keys starting with `_` are reserved for metadata.
fn validate_body(body: &Dictionary) -> CoreResult<()> {
    for (key, value) in body.iter() {
        if key.starts_with('_') {
            return Err(CoreError::validation(format!(
                "key {key:?} is reserved"
            )));
        }
        value.validate(key)?;
    }
    Ok(())
}
