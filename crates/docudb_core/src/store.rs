//! Committed revision records and the in-memory index over them.

use crate::error::CoreResult;
use crate::revision::RevisionId;
use crate::value::Dictionary;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// The latest committed revision of one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RevisionRecord {
    /// Document id.
    pub doc_id: String,
    /// This revision.
    pub revision: RevisionId,
    /// Known lineage, newest first; `history[0] == revision`.
    pub history: Vec<RevisionId>,
    /// True for a tombstone.
    pub deleted: bool,
    /// CBOR-encoded body; empty for tombstones.
    pub body: Vec<u8>,
    /// Store sequence assigned at commit (0 before commit).
    pub sequence: u64,
}

impl RevisionRecord {
    /// Decodes the body. Tombstones decode to an empty dictionary.
    ///
    /// # Errors
    ///
    /// Returns a codec error if the stored bytes are not a dictionary.
    pub fn decode_body(&self) -> CoreResult<Dictionary> {
        decode_body(&self.body)
    }

    /// Returns true if `revision` is this revision or one of its known ancestors.
    pub fn knows(&self, revision: &RevisionId) -> bool {
        self.revision == *revision || self.history.contains(revision)
    }

    /// Restores `history[0] == revision`.
    pub(crate) fn normalize_history(&mut self) {
        if self.history.first() != Some(&self.revision) {
            self.history.retain(|r| r != &self.revision);
            self.history.insert(0, self.revision.clone());
        }
    }
}

/// Encodes a body for storage and digesting.
pub(crate) fn encode_body(body: &Dictionary) -> CoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(body, &mut bytes)?;
    Ok(bytes)
}

pub(crate) fn decode_body(bytes: &[u8]) -> CoreResult<Dictionary> {
    if bytes.is_empty() {
        return Ok(Dictionary::new());
    }
    Ok(ciborium::from_reader(bytes)?)
}

/// Latest revision per document plus a sequence-ordered view of them.
#[derive(Debug, Default)]
pub(crate) struct DocumentIndex {
    latest: HashMap<String, Arc<RevisionRecord>>,
    by_sequence: BTreeMap<u64, String>,
    live: u64,
}

impl DocumentIndex {
    pub fn get(&self, doc_id: &str) -> Option<Arc<RevisionRecord>> {
        self.latest.get(doc_id).cloned()
    }

    /// Makes `record` the latest revision of its document.
    pub fn install(&mut self, record: RevisionRecord) -> Arc<RevisionRecord> {
        let record = Arc::new(record);
        if let Some(previous) = self
            .latest
            .insert(record.doc_id.clone(), Arc::clone(&record))
        {
            self.by_sequence.remove(&previous.sequence);
            if !previous.deleted {
                self.live -= 1;
            }
        }
        self.by_sequence
            .insert(record.sequence, record.doc_id.clone());
        if !record.deleted {
            self.live += 1;
        }
        record
    }

    /// Number of documents that are not tombstones.
    pub fn live_count(&self) -> u64 {
        self.live
    }

    /// Latest revisions committed after `since`, in sequence order.
    pub fn changes_since(&self, since: u64, limit: usize) -> Vec<Arc<RevisionRecord>> {
        self.by_sequence
            .range(since.saturating_add(1)..)
            .filter_map(|(_, id)| self.latest.get(id).cloned())
            .take(limit)
            .collect()
    }

    /// Every latest record in sequence order.
    pub fn all(&self) -> Vec<Arc<RevisionRecord>> {
        self.changes_since(0, usize::MAX)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.latest.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str, seq: u64, deleted: bool) -> RevisionRecord {
        let revision = RevisionId::derive(None, deleted, id.as_bytes());
        RevisionRecord {
            doc_id: id.into(),
            history: vec![revision.clone()],
            revision,
            deleted,
            body: Vec::new(),
            sequence: seq,
        }
    }

    #[test]
    fn install_replaces_previous_sequence() {
        let mut index = DocumentIndex::default();
        index.install(record("a", 1, false));
        index.install(record("b", 2, false));
        index.install(record("a", 3, false));

        let seqs: Vec<_> = index.all().iter().map(|r| r.sequence).collect();
        assert_eq!(seqs, [2, 3]);
        assert_eq!(index.live_count(), 2);
    }

    #[test]
    fn tombstones_are_not_counted() {
        let mut index = DocumentIndex::default();
        index.install(record("a", 1, false));
        index.install(record("a", 2, true));
        assert_eq!(index.live_count(), 0);
        assert!(index.get("a").unwrap().deleted);

        index.install(record("a", 3, false));
        assert_eq!(index.live_count(), 1);
    }

    #[test]
    fn changes_since_respects_cursor_and_limit() {
        let mut index = DocumentIndex::default();
        for (i, id) in ["a", "b", "c", "d"].iter().enumerate() {
            index.install(record(id, i as u64 + 1, false));
        }
        let ids: Vec<_> = index
            .changes_since(1, 2)
            .iter()
            .map(|r| r.doc_id.clone())
            .collect();
        assert_eq!(ids, ["b", "c"]);
        assert!(index.changes_since(4, 10).is_empty());
    }

    #[test]
    fn history_normalization() {
        let mut r = record("a", 1, false);
        let other = RevisionId::derive(None, false, b"other");
        r.history = vec![other.clone(), r.revision.clone()];
        r.normalize_history();
        assert_eq!(r.history, vec![r.revision.clone(), other]);
        assert!(r.knows(&r.revision.clone()));
    }

    #[test]
    fn empty_body_decodes_to_empty_dictionary() {
        assert!(decode_body(&[]).unwrap().is_empty());
        let mut body = Dictionary::new();
        body.set("k", "v");
        let bytes = encode_body(&body).unwrap();
        assert_eq!(decode_body(&bytes).unwrap(), body);
    }
}
