//! Append-only journal of committed revisions.
//!
//! Every committed save appends exactly one framed record, so a commit is
//! atomic at the granularity of a single `append` + `sync`.
//!
//! ## Record Format
//!
//! ```text
//! | magic (4) | version (2) | type (1) | length (4) | CBOR payload (N) | crc32 (4) |
//! ```
//!
//! ## Recovery Policy
//!
//! - A truncated header or payload at the end of the journal is a write
//!   cut short by a crash. It is dropped and the journal is truncated back
//!   to the last complete record.
//! - A checksum mismatch, bad magic, unknown version or an undecodable
//!   payload is corruption and aborts the open.

mod record;
mod writer;

pub use record::{JournalRecord, RecordKind};
pub use writer::{Journal, Replay};
