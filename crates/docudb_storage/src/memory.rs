//! In-memory storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::Arc;

/// A journal store kept entirely in memory.
///
/// Cloning the backend shares the underlying buffer, which lets a test keep
/// a handle and inspect or corrupt the bytes a database wrote.
///
/// # Example
///
/// ```rust
/// use docudb_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// backend.append(b"abc").unwrap();
/// assert_eq!(backend.size().unwrap(), 3);
/// ```
#[derive(Debug, Default, Clone)]
pub struct InMemoryBackend {
    bytes: Arc<RwLock<Vec<u8>>>,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `bytes`.
    ///
    /// Useful for recovery tests.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: Arc::new(RwLock::new(bytes)),
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn snapshot(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Overwrites the byte at `offset`, if there is one.
    ///
    /// Returns false when the offset is out of range.
    pub fn corrupt_byte(&self, offset: usize, value: u8) -> bool {
        match self.bytes.write().get_mut(offset) {
            Some(byte) => {
                *byte = value;
                true
            }
            None => false,
        }
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let start = usize::try_from(offset).unwrap_or(usize::MAX);
        match start.checked_add(len) {
            Some(end) if end <= bytes.len() => Ok(bytes[start..end].to_vec()),
            _ => Err(StorageError::ReadPastEnd { offset, len, size }),
        }
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let mut bytes = self.bytes.write();
        let offset = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let mut bytes = self.bytes.write();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size,
            });
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        *self.bytes.write() = data.to_vec();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_reports_offsets() {
        let mut backend = InMemoryBackend::new();
        assert_eq!(backend.append(b"one").unwrap(), 0);
        assert_eq!(backend.append(b"two").unwrap(), 3);
        assert_eq!(backend.size().unwrap(), 6);
        assert_eq!(backend.read_all().unwrap(), b"onetwo");
    }

    #[test]
    fn read_outside_range_fails() {
        let mut backend = InMemoryBackend::new();
        backend.append(b"hello").unwrap();

        assert!(matches!(
            backend.read_at(3, 10),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(matches!(
            backend.read_at(u64::MAX, 1),
            Err(StorageError::ReadPastEnd { .. })
        ));
        assert!(backend.read_at(5, 0).unwrap().is_empty());
    }

    #[test]
    fn truncate_drops_tail() {
        let mut backend = InMemoryBackend::with_data(b"keep-drop".to_vec());
        backend.truncate(4).unwrap();
        assert_eq!(backend.snapshot(), b"keep");
        assert!(matches!(
            backend.truncate(10),
            Err(StorageError::TruncatePastEnd { .. })
        ));
    }

    #[test]
    fn clones_share_bytes() {
        let mut backend = InMemoryBackend::new();
        let observer = backend.clone();
        backend.append(b"shared").unwrap();
        assert_eq!(observer.snapshot(), b"shared");

        assert!(observer.corrupt_byte(0, b'S'));
        assert_eq!(backend.read_at(0, 1).unwrap(), b"S");
        assert!(!observer.corrupt_byte(100, 0));
    }

    #[test]
    fn replace_swaps_content() {
        let mut backend = InMemoryBackend::with_data(b"old content".to_vec());
        backend.replace(b"new").unwrap();
        assert_eq!(backend.read_all().unwrap(), b"new");
    }

    mod props {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn appended_chunks_read_back_in_place(
                chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..16)
            ) {
                let mut backend = InMemoryBackend::new();
                let mut offsets = Vec::new();
                for chunk in &chunks {
                    offsets.push(backend.append(chunk).unwrap());
                }
                for (chunk, offset) in chunks.iter().zip(offsets) {
                    prop_assert_eq!(&backend.read_at(offset, chunk.len()).unwrap(), chunk);
                }
                prop_assert_eq!(backend.read_all().unwrap(), chunks.concat());
            }
        }
    }
}
