//! Applying revisions received from another replica.

use crate::revision::{merge_history, RevisionId};
use crate::store::RevisionRecord;

/// What happened to a revision offered by a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The document was unknown locally and was created.
    Inserted,
    /// The local revision is an ancestor of the incoming one.
    FastForwarded,
    /// The incoming revision was already known; nothing changed.
    Ignored,
    /// Both sides diverged; a new revision resolving them was committed.
    Merged {
        /// The resolving revision.
        revision: RevisionId,
    },
}

impl ApplyOutcome {
    /// Returns true if the store changed.
    pub fn changed(&self) -> bool {
        !matches!(self, ApplyOutcome::Ignored)
    }
}

/// Decision taken before the commit.
#[derive(Debug)]
pub(crate) enum Resolution {
    Insert(RevisionRecord),
    FastForward(RevisionRecord),
    Ignore,
    Merge(RevisionRecord),
}

/// Decides how `incoming` relates to the local `current` revision.
pub(crate) fn resolve(
    current: Option<&RevisionRecord>,
    mut incoming: RevisionRecord,
    max_history: usize,
) -> Resolution {
    incoming.normalize_history();
    incoming.history.truncate(max_history.max(1));

    let Some(current) = current else {
        return Resolution::Insert(incoming);
    };
    if current.knows(&incoming.revision) {
        return Resolution::Ignore;
    }
    if incoming.knows(&current.revision) {
        return Resolution::FastForward(incoming);
    }

    let winner = pick_winner(current, &incoming);
    let revision = RevisionId::merged(
        &current.revision,
        &incoming.revision,
        winner.deleted,
        &winner.body,
    );
    let history = merge_history(&revision, &current.history, &incoming.history, max_history);
    Resolution::Merge(RevisionRecord {
        doc_id: incoming.doc_id.clone(),
        revision,
        history,
        deleted: winner.deleted,
        body: winner.body.clone(),
        sequence: 0,
    })
}

/// Deletion wins; otherwise the greater revision (generation, then digest).
fn pick_winner<'a>(a: &'a RevisionRecord, b: &'a RevisionRecord) -> &'a RevisionRecord {
    match (a.deleted, b.deleted) {
        (true, false) => a,
        (false, true) => b,
        _ if b.revision > a.revision => b,
        _ => a,
    }
}
