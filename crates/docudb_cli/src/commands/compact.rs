//! Compact command implementation.

use super::CliResult;
use docudb_core::Database;
use std::io::Write;

/// Runs the compact command.
pub fn run(db: &Database, out: &mut impl Write) -> CliResult<()> {
    writeln!(out, "Compacting {}...", db.name())?;
    let stats = db.compact()?;
    let saved = stats.bytes_before.saturating_sub(stats.bytes_after);
    let percent = if stats.bytes_before > 0 {
        saved as f64 / stats.bytes_before as f64 * 100.0
    } else {
        0.0
    };

    writeln!(out, "  Records kept: {}", stats.records)?;
    writeln!(out, "  Size before:  {} bytes", stats.bytes_before)?;
    writeln!(out, "  Size after:   {} bytes", stats.bytes_after)?;
    writeln!(out, "  Space saved:  {saved} bytes ({percent:.1}%)")?;
    Ok(())
}
