//! Change feed for observing committed revisions.
//!
//! One event is emitted per commit, after the journal append is durable,
//! in commit order. Consumers either subscribe to a channel or poll the
//! bounded history with a sequence cursor.
//!
//! ```rust
//! use docudb_core::{Database, Document};
//!
//! let db = Database::open_in_memory("feed").unwrap();
//! let rx = db.subscribe();
//! db.save(&Document::with_id("a")).unwrap();
//! assert_eq!(rx.recv().unwrap().doc_id, "a");
//! ```

use crate::revision::RevisionId;
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// Where a committed revision came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeOrigin {
    /// Saved or deleted through the local API.
    Local,
    /// Applied from a replication peer (including merges).
    Remote,
}

/// A single committed change.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    /// Sequence number assigned by the commit.
    pub sequence: u64,
    /// Document id.
    pub doc_id: String,
    /// The committed revision.
    pub revision: RevisionId,
    /// True for tombstones.
    pub deleted: bool,
    /// Local save or replicated revision.
    pub origin: ChangeOrigin,
}

/// Distributes commit events to subscribers and keeps a short history.
pub struct ChangeFeed {
    subscribers: RwLock<Vec<Sender<ChangeEvent>>>,
    history: RwLock<VecDeque<ChangeEvent>>,
    max_history: usize,
}

impl ChangeFeed {
    /// Creates a feed keeping at most `max_history` events for polling.
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Returns a receiver for all future events.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes an event. Called by the commit path only.
    pub(crate) fn emit(&self, event: ChangeEvent) {
        {
            let mut history = self.history.write();
            history.push_back(event.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }
        // Dropped receivers are pruned here.
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Events with `sequence > cursor`, oldest first, at most `limit`.
    pub fn poll(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| e.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Sequence of the newest retained event, or 0.
    pub fn latest_sequence(&self) -> u64 {
        self.history.read().back().map_or(0, |e| e.sequence)
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}
