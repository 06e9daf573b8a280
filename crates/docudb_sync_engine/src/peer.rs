//! The other side of a replication.
//!
//! A [`ReplicationPeer`] answers the five protocol requests. [`LocalPeer`]
//! serves them from a database in the same process; the sync server wraps
//! the same type behind its HTTP routes, and [`RemotePeer`](crate::RemotePeer)
//! forwards them over an [`HttpClient`](crate::HttpClient).

use crate::error::{SyncError, SyncResult};
use docudb_core::{CoreError, Database, ListenerToken, RevisionId, RevisionRecord};
use docudb_sync_protocol::{
    ChangeEntry, ChangesRequest, ChangesResponse, FetchRequest, FetchResponse, HandshakeRequest,
    HandshakeResponse, PushRequest, PushResponse, Rejection, RevisionPayload, RevisionRef,
    RevsDiffRequest, RevsDiffResponse,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Callback handed to [`ReplicationPeer::watch`].
pub type WatchCallback = Box<dyn Fn() + Send + Sync>;

/// Something a replicator can exchange revisions with.
pub trait ReplicationPeer: Send + Sync {
    /// Opens a session.
    fn handshake(&self, request: &HandshakeRequest) -> SyncResult<HandshakeResponse>;

    /// Lists the latest revision of documents changed after a sequence.
    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse>;

    /// Returns the offered revisions the peer does not know.
    fn revs_diff(&self, request: &RevsDiffRequest) -> SyncResult<RevsDiffResponse>;

    /// Returns the current revision of each requested document.
    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse>;

    /// Stores revisions on the peer.
    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse>;

    /// Calls `notify` after the peer's contents change.
    ///
    /// Peers that cannot notify return `None`; continuous replicators then
    /// poll them.
    fn watch(&self, notify: WatchCallback) -> Option<ListenerToken> {
        let _ = notify;
        None
    }

    /// Cancels a [`watch`](Self::watch) registration.
    fn unwatch(&self, token: ListenerToken) {
        let _ = token;
    }

    /// Returns true if the peer is reachable.
    fn is_connected(&self) -> bool {
        true
    }

    /// Releases the peer. Further requests fail with
    /// [`SyncError::NotConnected`].
    fn close(&self) -> SyncResult<()> {
        Ok(())
    }
}

/// Open sessions a single client may hold at once.
///
/// A client that reconnects without closing its old session, or runs a
/// push and a pull replicator side by side, stays within this bound; the
/// least recently used session is dropped first.
pub const MAX_SESSIONS_PER_CLIENT: usize = 4;

struct Session {
    client_id: String,
    last_used: u64,
}

#[derive(Default)]
struct SessionTable {
    sessions: HashMap<String, Session>,
    clock: u64,
}

impl SessionTable {
    fn open(&mut self, client_id: &str) -> String {
        let mut owned: Vec<(u64, String)> = self
            .sessions
            .iter()
            .filter(|(_, s)| s.client_id == client_id)
            .map(|(id, s)| (s.last_used, id.clone()))
            .collect();
        if owned.len() >= MAX_SESSIONS_PER_CLIENT {
            owned.sort_unstable();
            let excess = owned.len() + 1 - MAX_SESSIONS_PER_CLIENT;
            for (_, id) in owned.into_iter().take(excess) {
                debug!(client = %client_id, session = %id, "session evicted");
                self.sessions.remove(&id);
            }
        }
        let id = uuid::Uuid::new_v4().simple().to_string();
        self.clock += 1;
        self.sessions.insert(
            id.clone(),
            Session {
                client_id: client_id.to_string(),
                last_used: self.clock,
            },
        );
        id
    }

    fn touch(&mut self, id: &str) -> bool {
        self.clock += 1;
        match self.sessions.get_mut(id) {
            Some(session) => {
                session.last_used = self.clock;
                true
            }
            None => false,
        }
    }
}

/// Serves replication requests from a local database.
pub struct LocalPeer {
    database: Arc<Database>,
    sessions: Mutex<SessionTable>,
    closed: AtomicBool,
}

impl LocalPeer {
    /// Creates a peer over `database`.
    pub fn new(database: Arc<Database>) -> Self {
        Self {
            database,
            sessions: Mutex::new(SessionTable::default()),
            closed: AtomicBool::new(false),
        }
    }

    /// The served database.
    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    fn check_session(&self, session: &str) -> SyncResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SyncError::NotConnected);
        }
        if !self.sessions.lock().touch(session) {
            return Err(SyncError::AuthenticationFailed(format!(
                "unknown session {session:?}"
            )));
        }
        Ok(())
    }
}

impl ReplicationPeer for LocalPeer {
    fn handshake(&self, request: &HandshakeRequest) -> SyncResult<HandshakeResponse> {
        if self.closed.load(Ordering::Acquire) {
            return Err(SyncError::NotConnected);
        }
        request.check_version()?;
        let session = self.sessions.lock().open(&request.client_id);
        debug!(
            database = %self.database.name(),
            client = %request.client_id,
            session = %session,
            "session opened"
        );
        Ok(HandshakeResponse::success(self.database.uuid(), session))
    }

    fn changes(&self, request: &ChangesRequest) -> SyncResult<ChangesResponse> {
        self.check_session(&request.session)?;
        let limit = request.limit.max(1) as usize;
        let mut records = self.database.changes_since(request.since, limit + 1)?;
        let has_more = records.len() > limit;
        records.truncate(limit);
        let changes = records
            .iter()
            .map(|r| ChangeEntry {
                sequence: r.sequence,
                doc_id: r.doc_id.clone(),
                rev: r.revision.to_string(),
                deleted: r.deleted,
            })
            .collect();
        Ok(ChangesResponse::new(changes, request.since, has_more))
    }

    fn revs_diff(&self, request: &RevsDiffRequest) -> SyncResult<RevsDiffResponse> {
        self.check_session(&request.session)?;
        let offered = parse_refs(&request.revisions)?;
        let missing = self
            .database
            .revs_diff(&offered)?
            .into_iter()
            .map(|(doc_id, rev)| RevisionRef::new(doc_id, rev.to_string()))
            .collect();
        Ok(RevsDiffResponse { missing })
    }

    fn fetch(&self, request: &FetchRequest) -> SyncResult<FetchResponse> {
        self.check_session(&request.session)?;
        let mut revisions = Vec::with_capacity(request.doc_ids.len());
        for doc_id in &request.doc_ids {
            if let Some(record) = self.database.revision(doc_id)? {
                revisions.push(record_to_payload(&record));
            }
        }
        Ok(FetchResponse { revisions })
    }

    fn push(&self, request: &PushRequest) -> SyncResult<PushResponse> {
        self.check_session(&request.session)?;
        let mut response = PushResponse::default();
        for payload in &request.revisions {
            let checked = payload
                .validate()
                .map_err(SyncError::from)
                .and_then(|()| payload_to_record(payload));
            let record = match checked {
                Ok(record) => record,
                Err(e) => {
                    warn!(doc_id = %payload.doc_id, error = %e, "rejected pushed revision");
                    response.rejected.push(rejection(payload, e.to_string()));
                    continue;
                }
            };
            match self.database.apply_remote_revision(record) {
                Ok(_) => response.accepted += 1,
                Err(e @ CoreError::Validation { .. }) => {
                    warn!(doc_id = %payload.doc_id, error = %e, "rejected pushed revision");
                    response.rejected.push(rejection(payload, e.to_string()));
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(response)
    }

    fn watch(&self, notify: WatchCallback) -> Option<ListenerToken> {
        Some(self.database.add_change_listener(move |_| notify()))
    }

    fn unwatch(&self, token: ListenerToken) {
        self.database.remove_change_listener(token);
    }

    fn is_connected(&self) -> bool {
        !self.closed.load(Ordering::Acquire) && self.database.is_open()
    }

    fn close(&self) -> SyncResult<()> {
        self.closed.store(true, Ordering::Release);
        self.sessions.lock().sessions.clear();
        Ok(())
    }
}

fn rejection(payload: &RevisionPayload, reason: String) -> Rejection {
    Rejection {
        doc_id: payload.doc_id.clone(),
        rev: payload.rev.clone(),
        reason,
    }
}

/// Parses a revision id received from a peer.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] for a malformed id.
pub fn parse_revision(rev: &str) -> SyncResult<RevisionId> {
    rev.parse()
        .map_err(|e: CoreError| SyncError::Protocol(e.to_string()))
}

/// Parses a batch of offered references.
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] if any revision id is malformed.
pub fn parse_refs(refs: &[RevisionRef]) -> SyncResult<Vec<(String, RevisionId)>> {
    refs.iter()
        .map(|r| -> SyncResult<_> { Ok((r.doc_id.clone(), parse_revision(&r.rev)?)) })
        .collect()
}

/// Converts a committed record to its wire form.
pub fn record_to_payload(record: &RevisionRecord) -> RevisionPayload {
    RevisionPayload {
        doc_id: record.doc_id.clone(),
        rev: record.revision.to_string(),
        history: record.history.iter().map(ToString::to_string).collect(),
        deleted: record.deleted,
        body: if record.deleted {
            Vec::new()
        } else {
            record.body.clone()
        },
    }
}

/// Converts a received payload to a record ready for
/// [`Database::apply_remote_revision`].
///
/// # Errors
///
/// Returns [`SyncError::Protocol`] if a revision id is malformed.
pub fn payload_to_record(payload: &RevisionPayload) -> SyncResult<RevisionRecord> {
    let history = payload
        .history
        .iter()
        .map(|r| parse_revision(r))
        .collect::<SyncResult<Vec<_>>>()?;
    Ok(RevisionRecord {
        doc_id: payload.doc_id.clone(),
        revision: parse_revision(&payload.rev)?,
        history,
        deleted: payload.deleted,
        body: payload.body.clone(),
        sequence: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use docudb_core::Document;

    fn peer_with_docs(n: usize) -> LocalPeer {
        let db = Arc::new(Database::open_in_memory("peer").unwrap());
        for i in 0..n {
            let doc = Document::with_id(format!("doc-{i}"));
            doc.set("index", i as i64);
            db.save(&doc).unwrap();
        }
        LocalPeer::new(db)
    }

    fn open(peer: &LocalPeer) -> String {
        let response = peer
            .handshake(&HandshakeRequest::new("client", "local"))
            .unwrap();
        assert!(response.success);
        assert_eq!(response.peer_uuid, peer.database().uuid());
        response.session.unwrap()
    }

    #[test]
    fn requests_need_a_session() {
        let peer = peer_with_docs(1);
        let err = peer.changes(&ChangesRequest::new("bogus", 0, 10)).unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));
    }

    #[test]
    fn reconnecting_client_does_not_accumulate_sessions() {
        let peer = peer_with_docs(1);
        let other = peer
            .handshake(&HandshakeRequest::new("other", "local"))
            .unwrap()
            .session
            .unwrap();
        let busy = open(&peer);
        let mut first = None;
        let mut last = String::new();
        for _ in 0..1000 {
            last = peer
                .handshake(&HandshakeRequest::new("c", "local"))
                .unwrap()
                .session
                .unwrap();
            first.get_or_insert_with(|| last.clone());
            // A session in steady use is never the one evicted.
            peer.changes(&ChangesRequest::new(&busy, 0, 1)).unwrap();
        }

        assert_eq!(peer.sessions.lock().sessions.len(), MAX_SESSIONS_PER_CLIENT + 2);
        let stale = first.unwrap();
        let err = peer.changes(&ChangesRequest::new(&stale, 0, 1)).unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));
        assert!(peer.changes(&ChangesRequest::new(&last, 0, 1)).is_ok());
        assert!(peer.changes(&ChangesRequest::new(&other, 0, 1)).is_ok());
        assert!(peer.changes(&ChangesRequest::new(&busy, 0, 1)).is_ok());
    }

    #[test]
    fn client_keeps_its_most_recent_sessions() {
        let peer = peer_with_docs(1);
        let sessions: Vec<String> = (0..MAX_SESSIONS_PER_CLIENT + 1).map(|_| open(&peer)).collect();

        let err = peer.changes(&ChangesRequest::new(&sessions[0], 0, 1)).unwrap_err();
        assert!(matches!(err, SyncError::AuthenticationFailed(_)));
        for session in &sessions[1..] {
            assert!(peer.changes(&ChangesRequest::new(session, 0, 1)).is_ok());
        }
    }

    #[test]
    fn changes_pages_with_has_more() {
        let peer = peer_with_docs(5);
        let session = open(&peer);

        let first = peer.changes(&ChangesRequest::new(&session, 0, 3)).unwrap();
        assert_eq!(first.changes.len(), 3);
        assert!(first.has_more);
        assert_eq!(first.last_sequence, 3);

        let rest = peer
            .changes(&ChangesRequest::new(&session, first.last_sequence, 3))
            .unwrap();
        assert_eq!(rest.changes.len(), 2);
        assert!(!rest.has_more);
        assert_eq!(rest.last_sequence, 5);
    }

    #[test]
    fn push_then_revs_diff_reports_nothing_missing() {
        let source = peer_with_docs(3);
        let target = peer_with_docs(0);
        let source_session = open(&source);
        let target_session = open(&target);

        let changes = source
            .changes(&ChangesRequest::new(&source_session, 0, 10))
            .unwrap();
        let offered: Vec<_> = changes.changes.iter().map(ChangeEntry::to_ref).collect();

        let diff = target
            .revs_diff(&RevsDiffRequest {
                session: target_session.clone(),
                revisions: offered.clone(),
            })
            .unwrap();
        assert_eq!(diff.missing.len(), 3);

        let fetched = source
            .fetch(&FetchRequest {
                session: source_session,
                doc_ids: diff.missing.iter().map(|r| r.doc_id.clone()).collect(),
            })
            .unwrap();
        let pushed = target
            .push(&PushRequest {
                session: target_session.clone(),
                revisions: fetched.revisions,
            })
            .unwrap();
        assert_eq!(pushed.accepted, 3);
        assert!(pushed.is_complete());
        assert_eq!(target.database().count(), 3);

        let diff = target
            .revs_diff(&RevsDiffRequest {
                session: target_session,
                revisions: offered,
            })
            .unwrap();
        assert!(diff.missing.is_empty());
    }

    #[test]
    fn malformed_payloads_are_rejected_individually() {
        let target = peer_with_docs(0);
        let session = open(&target);
        let good = record_to_payload(
            &peer_with_docs(1)
                .database()
                .revision("doc-0")
                .unwrap()
                .unwrap(),
        );
        let mut bad_rev = good.clone();
        bad_rev.doc_id = "other".into();
        bad_rev.rev = "zz".into();
        bad_rev.history = vec!["zz".into()];
        let mut bad_history = good.clone();
        bad_history.doc_id = "third".into();
        bad_history.history.clear();

        let response = target
            .push(&PushRequest {
                session,
                revisions: vec![bad_rev, good, bad_history],
            })
            .unwrap();
        assert_eq!(response.accepted, 1);
        assert_eq!(response.rejected.len(), 2);
        assert_eq!(target.database().count(), 1);
    }

    #[test]
    fn tombstones_round_trip() {
        let source = peer_with_docs(1);
        let doc = source.database().get_document("doc-0").unwrap().unwrap();
        source.database().delete(&doc).unwrap();
        let record = source.database().revision("doc-0").unwrap().unwrap();

        let payload = record_to_payload(&record);
        assert!(payload.deleted);
        assert!(payload.body.is_empty());
        payload.validate().unwrap();

        let back = payload_to_record(&payload).unwrap();
        assert_eq!(back.revision, record.revision);
        assert_eq!(back.history, record.history);
    }

    #[test]
    fn closed_peer_refuses_requests() {
        let peer = peer_with_docs(1);
        let session = open(&peer);
        peer.close().unwrap();
        assert!(!peer.is_connected());
        assert!(matches!(
            peer.changes(&ChangesRequest::new(session, 0, 1)),
            Err(SyncError::NotConnected)
        ));
        assert!(matches!(
            peer.handshake(&HandshakeRequest::new("c", "d")),
            Err(SyncError::NotConnected)
        ));
    }
}
