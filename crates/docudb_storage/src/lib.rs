//! # DocuDB Storage
//!
//! Byte-level storage backends for the DocuDB journal.
//!
//! A backend is an append-mostly byte store. It never interprets what it
//! holds: record framing, checksums and recovery belong to `docudb_core`.
//!
//! ## Available Backends
//!
//! - [`InMemoryBackend`] - ephemeral databases and tests
//! - [`FileBackend`] - a single file on the local file system
//! - [`FaultyBackend`] - wraps another backend and injects I/O failures
//!
//! ## Example
//!
//! ```rust
//! use docudb_storage::{InMemoryBackend, StorageBackend};
//!
//! let mut backend = InMemoryBackend::new();
//! let offset = backend.append(b"journal bytes").unwrap();
//! assert_eq!(backend.read_at(offset, 7).unwrap(), b"journal");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod faulty;
mod file;
mod memory;

pub use backend::StorageBackend;
pub use error::{StorageError, StorageResult};
pub use faulty::{FaultPlan, FaultyBackend};
pub use file::FileBackend;
pub use memory::InMemoryBackend;
