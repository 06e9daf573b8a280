//! Revision references and payloads carried by messages.

use crate::error::{ProtocolError, ProtocolResult};
use serde::{Deserialize, Serialize};

/// A (document, revision) pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RevisionRef {
    /// Document id.
    pub doc_id: String,
    /// Revision id in text form.
    pub rev: String,
}

impl RevisionRef {
    /// Creates a reference.
    pub fn new(doc_id: impl Into<String>, rev: impl Into<String>) -> Self {
        Self {
            doc_id: doc_id.into(),
            rev: rev.into(),
        }
    }
}

/// One entry of a peer's change feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    /// Sequence of the change on the sending peer.
    pub sequence: u64,
    /// Document id.
    pub doc_id: String,
    /// Latest revision of the document.
    pub rev: String,
    /// True for tombstones.
    pub deleted: bool,
}

impl ChangeEntry {
    /// The (document, revision) pair this entry announces.
    pub fn to_ref(&self) -> RevisionRef {
        RevisionRef::new(self.doc_id.clone(), self.rev.clone())
    }
}

/// A complete revision as shipped between peers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionPayload {
    /// Document id.
    pub doc_id: String,
    /// Revision id.
    pub rev: String,
    /// Ancestors, newest first, starting with `rev`.
    pub history: Vec<String>,
    /// True for tombstones.
    pub deleted: bool,
    /// Encoded document body; empty for tombstones.
    pub body: Vec<u8>,
}

impl RevisionPayload {
    /// Checks the structural rules every payload must follow.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidMessage`] if the id is empty, the
    /// history does not start with `rev`, or a tombstone carries a body.
    pub fn validate(&self) -> ProtocolResult<()> {
        if self.doc_id.is_empty() {
            return Err(ProtocolError::invalid("empty document id"));
        }
        if self.history.first() != Some(&self.rev) {
            return Err(ProtocolError::invalid(format!(
                "history of {} does not start with {}",
                self.doc_id, self.rev
            )));
        }
        if self.deleted && !self.body.is_empty() {
            return Err(ProtocolError::invalid(format!(
                "tombstone {} carries a body",
                self.doc_id
            )));
        }
        Ok(())
    }

    /// Approximate size on the wire, for batching.
    pub fn size_hint(&self) -> usize {
        self.doc_id.len() + self.body.len() + self.history.iter().map(String::len).sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload() -> RevisionPayload {
        RevisionPayload {
            doc_id: "doc".into(),
            rev: "2-bb".into(),
            history: vec!["2-bb".into(), "1-aa".into()],
            deleted: false,
            body: vec![0xa0],
        }
    }

    #[test]
    fn valid_payload() {
        assert!(payload().validate().is_ok());
    }

    #[test]
    fn history_must_start_with_rev() {
        let mut p = payload();
        p.history.reverse();
        assert!(p.validate().is_err());
    }

    #[test]
    fn tombstone_without_body() {
        let mut p = payload();
        p.deleted = true;
        assert!(p.validate().is_err());
        p.body.clear();
        assert!(p.validate().is_ok());
    }

    #[test]
    fn change_entry_ref() {
        let entry = ChangeEntry {
            sequence: 4,
            doc_id: "d".into(),
            rev: "1-aa".into(),
            deleted: false,
        };
        assert_eq!(entry.to_ref(), RevisionRef::new("d", "1-aa"));
    }
}
