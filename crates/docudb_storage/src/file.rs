//! File-based storage backend.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Suffix of the scratch file used by [`FileBackend::replace`].
const REPLACE_SUFFIX: &str = "rewrite";

/// A journal stored in one file.
///
/// `sync` maps to `File::sync_all`. `replace` writes a sibling scratch
/// file, syncs it and renames it over the journal, so a crash in the
/// middle leaves the previous journal intact.
///
/// # Example
///
/// ```no_run
/// use docudb_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("journal.log")).unwrap();
/// backend.append(b"record").unwrap();
/// backend.sync().unwrap();
/// ```
#[derive(Debug)]
pub struct FileBackend {
    path: PathBuf,
    file: Mutex<File>,
    size: u64,
}

impl FileBackend {
    /// Opens the file at `path`, creating it if needed.
    ///
    /// A scratch file left behind by an interrupted `replace` is removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        let scratch = scratch_path(path);
        if scratch.exists() {
            fs::remove_file(&scratch)?;
        }

        let file = open_rw(path)?;
        let size = file.metadata()?.len();
        Ok(Self {
            path: path.to_path_buf(),
            file: Mutex::new(file),
            size,
        })
    }

    /// Opens the file, creating missing parent directories first.
    ///
    /// # Errors
    ///
    /// Returns an error if a directory or the file cannot be created.
    pub fn open_with_create_dirs(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        Self::open(path)
    }

    /// Returns the path of the journal file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_rw(path: &Path) -> StorageResult<File> {
    Ok(OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)?)
}

fn scratch_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(REPLACE_SUFFIX);
    path.with_file_name(name)
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let end = offset.checked_add(len as u64);
        if end.map_or(true, |end| end > self.size) {
            return Err(StorageError::ReadPastEnd {
                offset,
                len,
                size: self.size,
            });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(offset))?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)?;
        Ok(buffer)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let offset = self.size;
        if data.is_empty() {
            return Ok(offset);
        }

        let file = self.file.get_mut();
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(data)?;
        self.size += data.len() as u64;
        Ok(offset)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let file = self.file.get_mut();
        file.flush()?;
        file.sync_all()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.size)
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        if new_size > self.size {
            return Err(StorageError::TruncatePastEnd {
                requested: new_size,
                size: self.size,
            });
        }
        let file = self.file.get_mut();
        file.set_len(new_size)?;
        file.sync_all()?;
        self.size = new_size;
        Ok(())
    }

    fn replace(&mut self, data: &[u8]) -> StorageResult<()> {
        let scratch = scratch_path(&self.path);
        {
            let mut out = File::create(&scratch)?;
            out.write_all(data)?;
            out.sync_all()?;
        }
        fs::rename(&scratch, &self.path)?;
        if let Some(parent) = self.path.parent() {
            // Directory fsync makes the rename durable; not supported everywhere.
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        *self.file.get_mut() = open_rw(&self.path)?;
        self.size = data.len() as u64;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn creates_missing_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(path.exists());
        assert_eq!(backend.path(), path);
    }

    #[test]
    fn data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");

        {
            let mut backend = FileBackend::open(&path).unwrap();
            backend.append(b"first|").unwrap();
            backend.append(b"second").unwrap();
            backend.sync().unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 12);
        assert_eq!(backend.read_at(6, 6).unwrap(), b"second");
        assert_eq!(backend.read_all().unwrap(), b"first|second");
    }

    #[test]
    fn read_past_end_fails() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("j")).unwrap();
        backend.append(b"12345").unwrap();
        assert!(matches!(
            backend.read_at(4, 2),
            Err(StorageError::ReadPastEnd { .. })
        ));
    }

    #[test]
    fn truncate_then_append_overwrites_tail() {
        let dir = tempdir().unwrap();
        let mut backend = FileBackend::open(&dir.path().join("j")).unwrap();
        backend.append(b"good-torn").unwrap();
        backend.truncate(4).unwrap();
        assert_eq!(backend.append(b"+next").unwrap(), 4);
        assert_eq!(backend.read_all().unwrap(), b"good+next");
    }

    #[test]
    fn replace_is_visible_after_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("journal.log");

        {
            let mut backend = FileBackend::open_with_create_dirs(&path).unwrap();
            backend.append(b"a long journal that will shrink").unwrap();
            backend.replace(b"short").unwrap();
            assert_eq!(backend.size().unwrap(), 5);
            backend.append(b"+tail").unwrap();
        }

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.read_all().unwrap(), b"short+tail");
        assert!(!scratch_path(&path).exists());
    }

    #[test]
    fn leftover_scratch_file_is_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("journal.log");
        fs::write(scratch_path(&path), b"half written").unwrap();

        let backend = FileBackend::open(&path).unwrap();
        assert_eq!(backend.size().unwrap(), 0);
        assert!(!scratch_path(&path).exists());
    }
}
