//! On-disk database directory.
//!
//! ```text
//! <parent>/<name>.docudb/
//! ├─ LOCK          # advisory lock held while the database is open
//! └─ journal.log   # framed revision journal
//! ```

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

const LOCK_FILE: &str = "LOCK";
const JOURNAL_FILE: &str = "journal.log";
const DIR_EXTENSION: &str = "docudb";

/// Holds the exclusive lock on a database directory.
#[derive(Debug)]
pub struct DatabaseDir {
    path: PathBuf,
    _lock_file: File,
}

impl DatabaseDir {
    /// Path of the directory for database `name` under `parent`.
    pub fn path_for(parent: &Path, name: &str) -> PathBuf {
        parent.join(format!("{name}.{DIR_EXTENSION}"))
    }

    /// Opens (optionally creating) the directory and takes its lock.
    ///
    /// # Errors
    ///
    /// - [`CoreError::DatabaseMissing`] if absent and `create_if_missing` is false
    /// - [`CoreError::DatabaseLocked`] if another handle holds the lock
    /// - I/O errors
    pub fn open(parent: &Path, name: &str, create_if_missing: bool) -> CoreResult<Self> {
        let path = Self::path_for(parent, name);
        if !path.is_dir() {
            if !create_if_missing {
                return Err(CoreError::DatabaseMissing { name: name.into() });
            }
            fs::create_dir_all(&path)?;
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;
        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::DatabaseLocked);
        }

        Ok(Self {
            path,
            _lock_file: lock_file,
        })
    }

    /// The database directory.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The journal file.
    pub fn journal_path(&self) -> PathBuf {
        self.path.join(JOURNAL_FILE)
    }

    /// Returns true if a database directory exists for `name`.
    pub fn exists(parent: &Path, name: &str) -> bool {
        Self::path_for(parent, name).join(JOURNAL_FILE).is_file()
    }

    /// Removes the directory of database `name`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DatabaseLocked`] while the database is open,
    /// or an I/O error.
    pub fn remove(parent: &Path, name: &str) -> CoreResult<()> {
        let path = Self::path_for(parent, name);
        if !path.exists() {
            return Err(CoreError::DatabaseMissing { name: name.into() });
        }
        // Taking the lock proves nobody has the database open.
        let guard = Self::open(parent, name, false)?;
        drop(guard);
        fs::remove_dir_all(&path)?;
        Ok(())
    }
}
