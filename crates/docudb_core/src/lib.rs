//! # DocuDB Core
//!
//! Revision-tracked document store for DocuDB.
//!
//! This crate provides:
//! - Typed document values (`Value`, `Dictionary`, `Array`, `Timestamp`)
//! - `Document`, a thread-safe in-memory handle with staged edits
//! - `Database`, which persists revisions to a crash-consistent journal
//! - Optimistic concurrency control and deterministic conflict merging
//! - A change feed plus a notification bus for listeners
//! - Replication checkpoints and revs-diff for the sync engine
//!
//! ## Key Invariants
//!
//! - Exactly one latest revision per document id
//! - A save is journaled before it becomes visible; a failed save changes nothing
//! - One change event per commit, delivered in commit order
//! - Listener code never runs on the writer's thread
//!
//! ## Example
//!
//! ```rust
//! use docudb_core::{Database, Document};
//!
//! let db = Database::open_in_memory("example").unwrap();
//! let doc = Document::new();
//! doc.set("title", "hello");
//! let rev = db.save(&doc).unwrap();
//! assert_eq!(rev.generation(), 1);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
mod database;
mod dir;
mod document;
mod error;
pub mod journal;
mod merge;
pub mod notify;
mod revision;
mod store;
mod value;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeOrigin};
pub use config::DatabaseConfig;
pub use database::{CompactionStats, ConcurrencyControl, Database};
pub use document::Document;
pub use error::{CoreError, CoreResult};
pub use merge::ApplyOutcome;
pub use notify::{Executor, InlineExecutor, ListenerToken, SerialExecutor};
pub use revision::RevisionId;
pub use store::RevisionRecord;
pub use value::{Array, Dictionary, Timestamp, Value};

/// Crate version, reported in replication handshakes and by the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
