//! In-memory document handle.

use crate::revision::RevisionId;
use crate::value::{Array, Dictionary, Timestamp, Value};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

/// A mutable, shareable view of one document.
///
/// Cloning a `Document` yields another handle to the same in-memory state,
/// so a document can be handed to several threads. Every accessor takes the
/// document's own lock for the duration of that single call; there is no
/// lock shared between documents.
///
/// Mutations are staged in memory and reach the store through
/// [`crate::Database::save`]. Use [`Document::update`] when several fields
/// must change together without another thread's save observing a
/// half-applied edit.
///
/// # Example
///
/// ```rust
/// use docudb_core::Document;
///
/// let doc = Document::with_id("user-1");
/// doc.set("name", "Ada");
/// doc.set("age", 36);
/// assert_eq!(doc.get_string("name").as_deref(), Some("Ada"));
/// assert_eq!(doc.get_double("age"), 36.0);
/// ```
#[derive(Clone)]
pub struct Document {
    inner: Arc<DocumentInner>,
}

struct DocumentInner {
    id: String,
    state: Mutex<DocumentState>,
}

#[derive(Default)]
struct DocumentState {
    body: Dictionary,
    revision: Option<RevisionId>,
    sequence: u64,
    deleted: bool,
    /// Bumped by every mutation.
    edits: u64,
    /// Value of `edits` captured by the last successful save.
    saved_edits: u64,
}

/// What a save reads from a document, taken under its lock.
#[derive(Debug, Clone)]
pub(crate) struct Staged {
    pub body: Dictionary,
    pub base: Option<RevisionId>,
    pub edits: u64,
}

impl Document {
    /// Creates an unsaved document with a generated id.
    pub fn new() -> Self {
        Self::with_id(uuid::Uuid::new_v4().simple().to_string())
    }

    /// Creates an unsaved document with the given id.
    pub fn with_id(id: impl Into<String>) -> Self {
        Self::build(id.into(), DocumentState::default())
    }

    /// Creates an unsaved document with an id and initial body.
    pub fn with_data(id: impl Into<String>, body: Dictionary) -> Self {
        Self::build(
            id.into(),
            DocumentState {
                body,
                edits: 1,
                ..DocumentState::default()
            },
        )
    }

    pub(crate) fn loaded(
        id: impl Into<String>,
        body: Dictionary,
        revision: RevisionId,
        sequence: u64,
    ) -> Self {
        Self::build(
            id.into(),
            DocumentState {
                body,
                revision: Some(revision),
                sequence,
                ..DocumentState::default()
            },
        )
    }

    fn build(id: String, state: DocumentState) -> Self {
        Self {
            inner: Arc::new(DocumentInner {
                id,
                state: Mutex::new(state),
            }),
        }
    }

    /// The document id.
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Revision this handle was loaded from or last saved as.
    pub fn revision_id(&self) -> Option<RevisionId> {
        self.inner.state.lock().revision.clone()
    }

    /// Store sequence of that revision, 0 if never saved.
    pub fn sequence(&self) -> u64 {
        self.inner.state.lock().sequence
    }

    /// True once this handle has been deleted through the database.
    pub fn is_deleted(&self) -> bool {
        self.inner.state.lock().deleted
    }

    /// True if the body changed since the last save or load.
    pub fn is_modified(&self) -> bool {
        let state = self.inner.state.lock();
        state.edits != state.saved_edits
    }

    /// Returns true if both handles refer to the same in-memory document.
    pub fn same_handle(&self, other: &Document) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Stores a value under `key`.
    pub fn set(&self, key: impl Into<String>, value: impl Into<Value>) {
        let (key, value) = (key.into(), value.into());
        let mut state = self.inner.state.lock();
        state.body.set(key, value);
        state.edits += 1;
    }

    /// Removes `key`, returning its value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let mut state = self.inner.state.lock();
        let removed = state.body.remove(key);
        if removed.is_some() {
            state.edits += 1;
        }
        removed
    }

    /// Replaces the whole body.
    pub fn set_data(&self, body: Dictionary) {
        let mut state = self.inner.state.lock();
        state.body = body;
        state.edits += 1;
    }

    /// Runs `edit` on the body while holding the document lock.
    ///
    /// A concurrent save sees either none or all of the closure's changes.
    pub fn update<R>(&self, edit: impl FnOnce(&mut Dictionary) -> R) -> R {
        let mut state = self.inner.state.lock();
        let result = edit(&mut state.body);
        state.edits += 1;
        result
    }

    /// Copy of the value under `key`.
    pub fn get(&self, key: &str) -> Option<Value> {
        self.inner.state.lock().body.get(key).cloned()
    }

    /// Returns true if `key` is present.
    pub fn contains(&self, key: &str) -> bool {
        self.inner.state.lock().body.contains_key(key)
    }

    /// Number of top-level keys.
    pub fn count(&self) -> usize {
        self.inner.state.lock().body.len()
    }

    /// Top-level keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.inner
            .state
            .lock()
            .body
            .keys()
            .map(str::to_string)
            .collect()
    }

    /// Copy of the whole body.
    pub fn to_dictionary(&self) -> Dictionary {
        self.inner.state.lock().body.clone()
    }

    /// Integer value of `key`, or 0.
    pub fn get_int(&self, key: &str) -> i32 {
        self.inner.state.lock().body.get_int(key)
    }

    /// Long value of `key`, or 0.
    pub fn get_long(&self, key: &str) -> i64 {
        self.inner.state.lock().body.get_long(key)
    }

    /// Float value of `key`, or 0.
    pub fn get_float(&self, key: &str) -> f32 {
        self.inner.state.lock().body.get_float(key)
    }

    /// Double value of `key`, or 0.
    pub fn get_double(&self, key: &str) -> f64 {
        self.inner.state.lock().body.get_double(key)
    }

    /// Boolean value of `key`, or false.
    pub fn get_boolean(&self, key: &str) -> bool {
        self.inner.state.lock().body.get_boolean(key)
    }

    /// String value of `key`.
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.inner
            .state
            .lock()
            .body
            .get_string(key)
            .map(str::to_string)
    }

    /// Date value of `key`.
    pub fn get_date(&self, key: &str) -> Option<Timestamp> {
        self.inner.state.lock().body.get_date(key)
    }

    /// Copy of the dictionary under `key`.
    ///
    /// Changes to the copy are applied by setting it back on the document.
    pub fn get_dictionary(&self, key: &str) -> Option<Dictionary> {
        self.inner.state.lock().body.get_dictionary(key).cloned()
    }

    /// Copy of the array under `key`.
    pub fn get_array(&self, key: &str) -> Option<Array> {
        self.inner.state.lock().body.get_array(key).cloned()
    }

    pub(crate) fn stage(&self) -> Staged {
        let state = self.inner.state.lock();
        Staged {
            body: state.body.clone(),
            base: state.revision.clone(),
            edits: state.edits,
        }
    }

    pub(crate) fn mark_saved(&self, revision: RevisionId, sequence: u64, deleted: bool, edits: u64) {
        let mut state = self.inner.state.lock();
        state.revision = Some(revision);
        state.sequence = sequence;
        state.deleted = deleted;
        state.saved_edits = state.saved_edits.max(edits);
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Document")
            .field("id", &self.inner.id)
            .field("revision", &state.revision)
            .field("deleted", &state.deleted)
            .field("body", &state.body)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn generated_ids_are_unique() {
        assert_ne!(Document::new().id(), Document::new().id());
    }

    #[test]
    fn clones_share_state() {
        let doc = Document::with_id("shared");
        let other = doc.clone();
        other.set("k", 1);
        assert_eq!(doc.get_int("k"), 1);
        assert!(doc.same_handle(&other));
        assert!(!doc.same_handle(&Document::with_id("shared")));
    }

    #[test]
    fn nested_containers_are_copies() {
        let doc = Document::with_id("nested");
        let mut address = Dictionary::new();
        address.set("city", "San Francisco");
        doc.set("address", address);

        let mut copy = doc.get_dictionary("address").unwrap();
        copy.set("city", "Oakland");
        assert_eq!(
            doc.get_dictionary("address").unwrap().get_string("city"),
            Some("San Francisco")
        );

        doc.set("address", copy);
        assert_eq!(
            doc.get_dictionary("address").unwrap().get_string("city"),
            Some("Oakland")
        );
    }

    #[test]
    fn modification_tracking() {
        let doc = Document::with_id("m");
        assert!(!doc.is_modified());
        doc.set("a", 1);
        assert!(doc.is_modified());

        let staged = doc.stage();
        doc.set("b", 2);
        doc.mark_saved(RevisionId::derive(None, false, b""), 1, false, staged.edits);
        // The edit made after staging is still pending.
        assert!(doc.is_modified());
    }

    #[test]
    fn update_applies_all_fields_together() {
        let doc = Document::with_id("u");
        let writers: Vec<_> = (0..4)
            .map(|t| {
                let doc = doc.clone();
                thread::spawn(move || {
                    for i in 0..200 {
                        doc.update(|body| {
                            body.set("a", t * 1000 + i);
                            body.set("b", t * 1000 + i);
                        });
                    }
                })
            })
            .collect();

        for _ in 0..200 {
            let staged = doc.stage();
            assert_eq!(staged.body.get_long("a"), staged.body.get_long("b"));
        }
        for w in writers {
            w.join().unwrap();
        }
    }
}
