//! Cross-crate integration test helpers.
//!
//! Provides utilities for tests that run several databases and
//! replicators together: polling for a condition, recording listener
//! events, and comparing database contents.

use docudb_core::{Database, Dictionary};
use parking_lot::{Condvar, Mutex};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Interval between checks in [`wait_until`].
pub const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Polls `condition` until it holds or `timeout` passes.
///
/// Returns whether the condition was met.
pub fn wait_until<F>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if Instant::now() >= deadline {
            return false;
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Collects events delivered to a listener, in delivery order.
///
/// Clones share the same log, so one clone can move into a listener while
/// the test keeps another.
pub struct EventRecorder<T> {
    shared: Arc<(Mutex<Vec<T>>, Condvar)>,
}

impl<T> Clone for EventRecorder<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Default for EventRecorder<T> {
    fn default() -> Self {
        Self {
            shared: Arc::new((Mutex::new(Vec::new()), Condvar::new())),
        }
    }
}

impl<T: Clone> EventRecorder<T> {
    /// Creates an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an event and wakes waiters.
    pub fn record(&self, event: T) {
        let (events, changed) = &*self.shared;
        events.lock().push(event);
        changed.notify_all();
    }

    /// Returns a closure suitable for a listener registration.
    pub fn sink(&self) -> impl Fn(&T) + Send + Sync + 'static
    where
        T: Send + 'static,
    {
        let recorder = self.clone();
        move |event: &T| recorder.record(event.clone())
    }

    /// A copy of every event so far.
    pub fn events(&self) -> Vec<T> {
        self.shared.0.lock().clone()
    }

    /// Number of events so far.
    pub fn len(&self) -> usize {
        self.shared.0.lock().len()
    }

    /// Returns true if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Blocks until some recorded event matches `predicate`.
    ///
    /// Returns the first matching event, or `None` after `timeout`.
    pub fn wait_for<F>(&self, timeout: Duration, predicate: F) -> Option<T>
    where
        F: Fn(&T) -> bool,
    {
        let deadline = Instant::now() + timeout;
        let (events, changed) = &*self.shared;
        let mut guard = events.lock();
        loop {
            if let Some(found) = guard.iter().find(|e| predicate(e)) {
                return Some(found.clone());
            }
            if changed.wait_until(&mut guard, deadline).timed_out() {
                return guard.iter().find(|e| predicate(e)).cloned();
            }
        }
    }
}

/// Live documents of a database keyed by id.
pub fn snapshot(db: &Database) -> BTreeMap<String, Dictionary> {
    db.document_ids()
        .into_iter()
        .filter_map(|id| {
            let doc = db.get_document(&id).expect("Failed to read document")?;
            Some((id, doc.to_dictionary()))
        })
        .collect()
}

/// Returns true if every database holds the same live documents.
pub fn databases_converged(dbs: &[&Database]) -> bool {
    let mut snapshots = dbs.iter().map(|db| snapshot(db));
    match snapshots.next() {
        Some(first) => snapshots.all(|other| other == first),
        None => true,
    }
}

/// Asserts that every database holds the same live documents.
pub fn assert_converged(dbs: &[&Database]) {
    let snapshots: Vec<_> = dbs.iter().map(|db| snapshot(db)).collect();
    for (i, other) in snapshots.iter().enumerate().skip(1) {
        let missing: Vec<_> = snapshots[0]
            .keys()
            .filter(|id| !other.contains_key(*id))
            .collect();
        assert!(missing.is_empty(), "database {i} is missing {:?}", missing);
        assert_eq!(&snapshots[0], other, "database {i} differs from database 0");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{create_docs, TestDatabase};
    use docudb_core::ChangeEvent;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_wait_until() {
        let calls = AtomicUsize::new(0);
        assert!(wait_until(Duration::from_secs(1), || {
            calls.fetch_add(1, Ordering::SeqCst) >= 2
        }));
        assert!(!wait_until(Duration::from_millis(30), || false));
    }

    #[test]
    fn test_recorder_collects_change_events() {
        let db = TestDatabase::memory("recorder");
        let recorder: EventRecorder<ChangeEvent> = EventRecorder::new();
        let token = db.add_change_listener(recorder.sink());

        create_docs(&db, "rec", 3);
        let last = recorder.wait_for(Duration::from_secs(5), |e| e.doc_id == "rec_doc_002");
        assert!(last.is_some());
        assert!(db.remove_change_listener(token));
    }

    #[test]
    fn test_wait_for_times_out() {
        let recorder: EventRecorder<u32> = EventRecorder::new();
        recorder.record(1);
        assert_eq!(recorder.wait_for(Duration::from_millis(20), |n| *n == 2), None);
        assert_eq!(recorder.events(), vec![1]);
    }

    #[test]
    fn test_convergence_checks() {
        let a = TestDatabase::memory("a");
        let b = TestDatabase::memory("b");
        assert!(databases_converged(&[&*a, &*b]));

        create_docs(&a, "x", 2);
        assert!(!databases_converged(&[&*a, &*b]));

        create_docs(&b, "x", 2);
        assert_converged(&[&*a, &*b]);
    }
}
