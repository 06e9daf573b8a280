//! Test fixtures and database helpers.
//!
//! Provides the sample documents used across the concurrency tests and
//! databases that clean up after themselves.

use docudb_core::{
    Array, Database, DatabaseConfig, Dictionary, Document, Timestamp,
};
use docudb_storage::{FaultPlan, FaultyBackend, InMemoryBackend};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;

/// A test database with automatic cleanup.
pub struct TestDatabase {
    /// The database instance.
    pub db: Arc<Database>,
    name: String,
    /// The temporary directory (kept alive to prevent cleanup).
    temp_dir: Option<TempDir>,
}

impl TestDatabase {
    /// Creates a new in-memory test database.
    pub fn memory(name: &str) -> Self {
        Self {
            db: Arc::new(Database::open_in_memory(name).expect("Failed to open in-memory database")),
            name: name.to_string(),
            temp_dir: None,
        }
    }

    /// Creates a new on-disk test database in a fresh temporary directory.
    pub fn file(name: &str) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db = Database::open(name, DatabaseConfig::new().directory(temp_dir.path()))
            .expect("Failed to open file database");
        Self {
            db: Arc::new(db),
            name: name.to_string(),
            temp_dir: Some(temp_dir),
        }
    }

    /// Creates an in-memory database whose journal fails on demand.
    pub fn faulty(name: &str) -> (Self, FaultPlan) {
        let (backend, plan) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
        let db = Database::open_with_backend(name, DatabaseConfig::new(), Box::new(backend))
            .expect("Failed to open faulty database");
        let test_db = Self {
            db: Arc::new(db),
            name: name.to_string(),
            temp_dir: None,
        };
        (test_db, plan)
    }

    /// A shared handle, e.g. for a replicator configuration.
    pub fn handle(&self) -> Arc<Database> {
        Arc::clone(&self.db)
    }

    /// Returns the parent directory if file-based, None if in-memory.
    pub fn directory(&self) -> Option<&Path> {
        self.temp_dir.as_ref().map(TempDir::path)
    }

    /// Returns the database directory if file-based, None if in-memory.
    pub fn path(&self) -> Option<PathBuf> {
        self.db.path()
    }

    /// Closes and reopens an on-disk database, replaying its journal.
    ///
    /// Panics for in-memory databases, which do not survive a close.
    pub fn reopen(&mut self) {
        let dir = self
            .temp_dir
            .as_ref()
            .expect("Only file databases can be reopened")
            .path()
            .to_path_buf();
        self.db.close().expect("Failed to close database");
        let db = Database::open(&self.name, DatabaseConfig::new().directory(dir))
            .expect("Failed to reopen database");
        self.db = Arc::new(db);
    }
}

impl std::ops::Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.db
    }
}

/// Runs a test with a temporary in-memory database.
///
/// # Example
///
/// ```rust
/// use docudb_testkit::with_temp_db;
///
/// with_temp_db(|db| {
///     db.save(&docudb_testkit::create_document(1)).unwrap();
///     assert_eq!(db.count(), 1);
/// });
/// ```
pub fn with_temp_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database) -> R,
{
    let test_db = TestDatabase::memory("test");
    f(&test_db.db)
}

/// Runs a test with a temporary on-disk database.
pub fn with_file_db<F, R>(f: F) -> R
where
    F: FnOnce(&Database, &Path) -> R,
{
    let test_db = TestDatabase::file("test");
    let dir = test_db
        .directory()
        .expect("File database should have a directory")
        .to_path_buf();
    f(&test_db.db, &dir)
}

/// The id used by [`create_document`]: `doc{i}`.
pub fn doc_id(i: usize) -> String {
    format!("doc{i}")
}

/// Id for the `i`th document of a named set: `{prefix}_doc_{i:03}`.
pub fn prefixed_doc_id(prefix: &str, i: usize) -> String {
    format!("{prefix}_doc_{i:03}")
}

/// Builds the sample document `doc{i}`.
///
/// Fields: `index`, `even`, `firstName`, `lastName`, `address` (street,
/// city, state), `phones` (two numbers) and `updated` (now).
pub fn create_document(i: usize) -> Document {
    let doc = Document::with_id(doc_id(i));
    doc.update(|body| {
        body.set("index", i as i64);
        body.set("even", i % 2 == 0);
        body.set("firstName", "Daniel");
        body.set("lastName", "Tiger");

        let mut address = Dictionary::new();
        address.set("street", format!("{i} Main street"));
        address.set("city", "Mountain View");
        address.set("state", "CA");
        body.set("address", address);

        let phones: Array = [format!("650-123-{i:04}"), format!("650-123-{:04}", i + 1)]
            .into_iter()
            .collect();
        body.set("phones", phones);
        body.set("updated", Timestamp::now());
    });
    doc
}

/// Applies update number `i` to `doc` as one atomic edit.
///
/// Sets `update`, `even`, `firstName`, `lastName`, `address`, `phones`
/// and `updated`; leaves `index` alone.
pub fn update_document(doc: &Document, i: usize) {
    doc.update(|body| {
        body.set("update", i as i64);
        body.set("even", i % 2 == 0);
        body.set("firstName", format!("Daniel-{i}"));
        body.set("lastName", format!("Tiger-{i}"));

        let mut address = Dictionary::new();
        address.set("street", format!("{i} first street"));
        address.set("city", "Mountain View");
        address.set("state", "CA");
        body.set("address", address);

        let phones: Array = [format!("1-650-123-{i:04}"), format!("1-650-123-{:04}", i + 1)]
            .into_iter()
            .collect();
        body.set("phones", phones);
        body.set("updated", Timestamp::now());
    });
}

/// Saves `n` documents `{prefix}_doc_000..` with a `key` field and
/// returns their ids.
pub fn create_docs(db: &Database, prefix: &str, n: usize) -> Vec<String> {
    (0..n)
        .map(|i| {
            let doc = Document::with_id(prefixed_doc_id(prefix, i));
            doc.set("key", i as i64);
            db.save(&doc).expect("Failed to save document");
            doc.id().to_string()
        })
        .collect()
}

/// Validators for the sample documents.
pub mod validators {
    use docudb_core::{Dictionary, Document};

    /// Asserts that `doc` is exactly `create_document(i)`.
    pub fn assert_created(doc: &Document, i: usize) {
        assert_eq!(doc.id(), super::doc_id(i));
        assert_created_body(&doc.to_dictionary(), i);
    }

    /// Asserts that `body` holds the fields of `create_document(i)`.
    pub fn assert_created_body(body: &Dictionary, i: usize) {
        assert_eq!(body.get_long("index"), i as i64);
        assert_eq!(body.get_int("index"), i as i32);
        assert_eq!(body.get_double("index"), i as f64);
        assert_eq!(body.get_boolean("even"), i % 2 == 0);
        assert_eq!(body.get_string("firstName"), Some("Daniel"));
        assert_eq!(body.get_string("lastName"), Some("Tiger"));
        assert!(body.get_date("updated").is_some());

        let address = body.get_dictionary("address").expect("address");
        assert_eq!(address.get_string("street"), Some(format!("{i} Main street").as_str()));
        assert_eq!(address.get_string("city"), Some("Mountain View"));
        assert_eq!(address.get_string("state"), Some("CA"));

        let phones = body.get_array("phones").expect("phones");
        assert_eq!(phones.get_string(0), Some(format!("650-123-{i:04}").as_str()));
        assert_eq!(phones.get_string(1), Some(format!("650-123-{:04}", i + 1).as_str()));
    }

    /// Returns the update number of a body written by `update_document`,
    /// after checking every field agrees with it.
    ///
    /// A body mixing fields of two updates fails the check.
    pub fn assert_consistent_update(body: &Dictionary, index: usize) -> usize {
        assert_eq!(body.get_long("index"), index as i64, "index must not change");
        let u = usize::try_from(body.get_long("update")).expect("update is non-negative");
        assert_eq!(body.get_double("update"), u as f64);
        assert_eq!(body.get_boolean("even"), u % 2 == 0);
        assert_eq!(body.get_string("firstName"), Some(format!("Daniel-{u}").as_str()));
        assert_eq!(body.get_string("lastName"), Some(format!("Tiger-{u}").as_str()));
        assert!(body.get_date("updated").is_some());

        let address = body.get_dictionary("address").expect("address");
        assert_eq!(address.get_string("street"), Some(format!("{u} first street").as_str()));
        assert_eq!(address.get_string("city"), Some("Mountain View"));
        assert_eq!(address.get_string("state"), Some("CA"));

        let phones = body.get_array("phones").expect("phones");
        assert_eq!(phones.get_string(0), Some(format!("1-650-123-{u:04}").as_str()));
        assert_eq!(phones.get_string(1), Some(format!("1-650-123-{:04}", u + 1).as_str()));
        u
    }
}
