//! Database configuration.

use std::path::{Path, PathBuf};

/// Configuration for opening a database.
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Parent directory holding `<name>.docudb/`. `None` keeps the
    /// database in memory.
    pub directory: Option<PathBuf>,

    /// Whether to create the database if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to sync the journal on every commit.
    pub sync_on_commit: bool,

    /// Number of ancestor revision ids kept per document.
    pub max_revision_history: usize,

    /// Number of change events kept for polling.
    pub feed_history: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            directory: None,
            create_if_missing: true,
            sync_on_commit: true,
            max_revision_history: 20,
            feed_history: 10_000,
        }
    }
}

impl DatabaseConfig {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the database under `directory`.
    #[must_use]
    pub fn directory(mut self, directory: impl AsRef<Path>) -> Self {
        self.directory = Some(directory.as_ref().to_path_buf());
        self
    }

    /// Sets whether to create the database if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to sync the journal on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Sets how many ancestor revisions are kept per document.
    ///
    /// Values below 1 are raised to 1.
    #[must_use]
    pub const fn max_revision_history(mut self, depth: usize) -> Self {
        self.max_revision_history = if depth == 0 { 1 } else { depth };
        self
    }

    /// Sets how many change events are kept for polling.
    #[must_use]
    pub const fn feed_history(mut self, events: usize) -> Self {
        self.feed_history = events;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config() {
        let config = DatabaseConfig::default();
        assert!(config.directory.is_none());
        assert!(config.create_if_missing);
        assert!(config.sync_on_commit);
        assert_eq!(config.max_revision_history, 20);
    }

    #[test]
    fn builder_pattern() {
        let config = DatabaseConfig::new()
            .directory("/tmp/dbs")
            .create_if_missing(false)
            .sync_on_commit(false)
            .max_revision_history(0)
            .feed_history(5);

        assert_eq!(config.directory.as_deref(), Some(Path::new("/tmp/dbs")));
        assert!(!config.create_if_missing);
        assert!(!config.sync_on_commit);
        assert_eq!(config.max_revision_history, 1);
        assert_eq!(config.feed_history, 5);
    }
}
