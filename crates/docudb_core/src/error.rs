//! Error types for DocuDB core.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in DocuDB core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] docudb_storage::StorageError),

    /// I/O error outside the storage backend (directory, lock file).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A document id, key or value was rejected.
    #[error("invalid document: {message}")]
    Validation {
        /// What was wrong.
        message: String,
    },

    /// The document was saved from a revision that is no longer current.
    #[error("conflict saving document {doc_id:?}: base revision is stale")]
    Conflict {
        /// The conflicting document.
        doc_id: String,
    },

    /// A save or delete failed; the store is unchanged.
    #[error("failed to save document {doc_id:?}: {source}")]
    SaveFailed {
        /// The document being written.
        doc_id: String,
        /// Underlying cause.
        #[source]
        source: Box<CoreError>,
    },

    /// Document not found or already deleted.
    #[error("document not found: {doc_id:?}")]
    NotFound {
        /// The id that was looked up.
        doc_id: String,
    },

    /// The journal holds bytes that cannot be decoded.
    #[error("journal corruption at offset {offset}: {message}")]
    JournalCorruption {
        /// Offset of the damaged record.
        offset: u64,
        /// Description of the damage.
        message: String,
    },

    /// Checksum mismatch detected.
    #[error("checksum mismatch at offset {offset}: expected {expected:08x}, got {actual:08x}")]
    ChecksumMismatch {
        /// Offset of the damaged record.
        offset: u64,
        /// Stored checksum.
        expected: u32,
        /// Computed checksum.
        actual: u32,
    },

    /// A body or record could not be encoded or decoded.
    #[error("codec error: {0}")]
    Codec(String),

    /// Another process holds the database lock.
    #[error("database locked: another process has exclusive access")]
    DatabaseLocked,

    /// The database has been closed.
    #[error("database is closed")]
    DatabaseClosed,

    /// The database does not exist and may not be created.
    #[error("database {name:?} does not exist")]
    DatabaseMissing {
        /// Database name.
        name: String,
    },

    /// Operation not permitted in the current state.
    #[error("invalid operation: {message}")]
    InvalidOperation {
        /// Description of why the operation is invalid.
        message: String,
    },
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Creates a conflict error.
    pub fn conflict(doc_id: impl Into<String>) -> Self {
        Self::Conflict {
            doc_id: doc_id.into(),
        }
    }

    /// Creates a not found error.
    pub fn not_found(doc_id: impl Into<String>) -> Self {
        Self::NotFound {
            doc_id: doc_id.into(),
        }
    }

    /// Creates a journal corruption error.
    pub fn journal_corruption(offset: u64, message: impl Into<String>) -> Self {
        Self::JournalCorruption {
            offset,
            message: message.into(),
        }
    }

    /// Creates an invalid operation error.
    pub fn invalid_operation(message: impl Into<String>) -> Self {
        Self::InvalidOperation {
            message: message.into(),
        }
    }

    /// Wraps `self` as the cause of a failed write to `doc_id`.
    ///
    /// Validation and conflict errors are returned unchanged, since they
    /// already describe the document.
    pub fn while_saving(self, doc_id: &str) -> Self {
        match self {
            Self::Validation { .. } | Self::Conflict { .. } | Self::SaveFailed { .. } => self,
            Self::DatabaseClosed => self,
            other => Self::SaveFailed {
                doc_id: doc_id.to_string(),
                source: Box::new(other),
            },
        }
    }

    /// Returns true for failures of the underlying device or files.
    pub fn is_io(&self) -> bool {
        match self {
            Self::Storage(_)
            | Self::Io(_)
            | Self::JournalCorruption { .. }
            | Self::ChecksumMismatch { .. } => true,
            Self::SaveFailed { source, .. } => source.is_io(),
            _ => false,
        }
    }
}

impl From<ciborium::de::Error<io::Error>> for CoreError {
    fn from(err: ciborium::de::Error<io::Error>) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<ciborium::ser::Error<io::Error>> for CoreError {
    fn from(err: ciborium::ser::Error<io::Error>) -> Self {
        Self::Codec(err.to_string())
    }
}
