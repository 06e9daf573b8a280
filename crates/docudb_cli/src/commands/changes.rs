//! Changes command implementation.

use super::CliResult;
use docudb_core::Database;
use std::io::Write;

/// Lists up to `limit` revisions committed after `since`, one per line:
/// `sequence id revision [deleted]`.
pub fn run(db: &Database, since: u64, limit: usize, out: &mut impl Write) -> CliResult<()> {
    let changes = db.changes_since(since, limit)?;
    for record in &changes {
        let marker = if record.deleted { " deleted" } else { "" };
        writeln!(
            out,
            "{:>8} {} {}{}",
            record.sequence, record.doc_id, record.revision, marker
        )?;
    }
    if changes.is_empty() {
        writeln!(out, "No changes after sequence {since}")?;
    }
    Ok(())
}
