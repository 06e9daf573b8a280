//! Journal writer and replay.

use super::record::{decode_frames, encode_frame, JournalRecord};
use crate::error::CoreResult;
use docudb_storage::StorageBackend;
use parking_lot::Mutex;
use tracing::warn;

/// Records recovered from the journal at open.
#[derive(Debug, Default)]
pub struct Replay {
    /// Complete records with their byte offsets.
    pub records: Vec<(u64, JournalRecord)>,
    /// Bytes of torn tail that were discarded.
    pub discarded_bytes: u64,
}

/// Serialized access to the journal backend.
pub struct Journal {
    backend: Mutex<Box<dyn StorageBackend>>,
    sync_on_commit: bool,
}

impl Journal {
    /// Wraps a backend.
    pub fn new(backend: Box<dyn StorageBackend>, sync_on_commit: bool) -> Self {
        Self {
            backend: Mutex::new(backend),
            sync_on_commit,
        }
    }

    /// Reads every complete record and cuts off a torn tail.
    ///
    /// # Errors
    ///
    /// Returns an error on corruption or if the backend cannot be read.
    pub fn recover(&self) -> CoreResult<Replay> {
        let mut backend = self.backend.lock();
        let bytes = backend.read_all()?;
        let decoded = decode_frames(&bytes)?;
        let discarded_bytes = bytes.len() as u64 - decoded.valid_len;
        if discarded_bytes > 0 {
            warn!(
                discarded_bytes,
                valid_len = decoded.valid_len,
                "discarding incomplete journal tail"
            );
            backend.truncate(decoded.valid_len)?;
        }
        Ok(Replay {
            records: decoded.records,
            discarded_bytes,
        })
    }

    /// Appends one record and makes it durable.
    ///
    /// On failure the journal is rolled back to its previous length, so a
    /// failed append never leaves a partial record behind.
    ///
    /// # Errors
    ///
    /// Returns the backend error that made the append fail.
    pub fn append(&self, record: &JournalRecord) -> CoreResult<u64> {
        let frame = encode_frame(record)?;
        let mut backend = self.backend.lock();
        let start = backend.size()?;

        let written = backend.append(&frame).and_then(|offset| {
            if self.sync_on_commit {
                backend.sync()?;
            }
            Ok(offset)
        });

        match written {
            Ok(offset) => Ok(offset),
            Err(err) => {
                if let Err(rollback) = backend.truncate(start) {
                    warn!(error = %rollback, start, "journal rollback failed");
                }
                Err(err.into())
            }
        }
    }

    /// Replaces the journal with `records`.
    ///
    /// Returns the new journal size.
    ///
    /// # Errors
    ///
    /// Returns an error if encoding or the atomic replace fails; the old
    /// journal stays in place.
    pub fn rewrite(&self, records: &[JournalRecord]) -> CoreResult<u64> {
        let mut image = Vec::new();
        for record in records {
            image.extend(encode_frame(record)?);
        }
        let mut backend = self.backend.lock();
        backend.replace(&image)?;
        backend.sync()?;
        Ok(image.len() as u64)
    }

    /// Current journal size in bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Forces everything appended so far to durable storage.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        Ok(self.backend.lock().sync()?)
    }
}
