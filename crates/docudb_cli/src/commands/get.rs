//! Get command implementation.

use super::{dictionary_to_json, CliError, CliResult};
use docudb_core::Database;
use std::io::Write;

/// Prints the body of document `id` as pretty JSON.
pub fn run(db: &Database, id: &str, out: &mut impl Write) -> CliResult<()> {
    let doc = db
        .get_document(id)?
        .ok_or_else(|| CliError::NotFound(id.to_string()))?;
    serde_json::to_writer_pretty(&mut *out, &dictionary_to_json(&doc.to_dictionary()))?;
    writeln!(out)?;
    Ok(())
}
