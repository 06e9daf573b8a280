//! Info command implementation.

use super::CliResult;
use crate::Format;
use docudb_core::Database;
use serde::Serialize;
use std::io::Write;

/// Database summary.
#[derive(Debug, Serialize)]
pub struct DatabaseInfo {
    /// Database name.
    pub name: String,
    /// Database UUID.
    pub uuid: String,
    /// Live documents.
    pub documents: u64,
    /// Last committed sequence.
    pub last_sequence: u64,
    /// Journal size in bytes.
    pub journal_bytes: u64,
}

impl DatabaseInfo {
    /// Collects the summary for `db`.
    pub fn collect(db: &Database) -> CliResult<Self> {
        Ok(Self {
            name: db.name().to_string(),
            uuid: db.uuid().to_string(),
            documents: db.count(),
            last_sequence: db.last_sequence(),
            journal_bytes: db.journal_size()?,
        })
    }
}

/// Runs the info command.
pub fn run(db: &Database, format: Format, out: &mut impl Write) -> CliResult<()> {
    let info = DatabaseInfo::collect(db)?;
    match format {
        Format::Json => {
            serde_json::to_writer_pretty(&mut *out, &info)?;
            writeln!(out)?;
        }
        Format::Text => {
            writeln!(out, "Database:      {}", info.name)?;
            writeln!(out, "UUID:          {}", info.uuid)?;
            writeln!(out, "Documents:     {}", info.documents)?;
            writeln!(out, "Last sequence: {}", info.last_sequence)?;
            writeln!(out, "Journal size:  {} bytes", info.journal_bytes)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docudb_core::Document;

    #[test]
    fn json_info() {
        let db = Database::open_in_memory("info").unwrap();
        db.save(&Document::with_id("a")).unwrap();

        let mut out = Vec::new();
        run(&db, Format::Json, &mut out).unwrap();
        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed["name"], "info");
        assert_eq!(parsed["documents"], 1);
        assert_eq!(parsed["last_sequence"], 1);
        assert_eq!(parsed["uuid"], db.uuid());
    }
}
