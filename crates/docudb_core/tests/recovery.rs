//! Persistence, crash recovery and failure atomicity.

use docudb_core::{
    Array, CoreError, Database, DatabaseConfig, Dictionary, Document, Timestamp, Value,
};
use docudb_storage::{FaultyBackend, InMemoryBackend, StorageBackend};
use tempfile::tempdir;

fn sample_document(id: &str) -> Document {
    let doc = Document::with_id(id);
    doc.set("name", "Scott");
    doc.set("age", 42);
    doc.set("ratio", 0.25);
    doc.set("active", true);
    doc.set("born", Timestamp::from_millis(1_234_567_890_000));

    let mut address = Dictionary::new();
    address.set("street", "1 Main St.");
    address.set("zip", 94_102);
    doc.set("address", address);

    let phones: Array = ["650-123-0001", "650-123-0002"]
        .into_iter()
        .map(Value::from)
        .collect();
    doc.set("phones", phones);
    doc
}

#[test]
fn documents_survive_reopen() {
    let dir = tempdir().unwrap();
    let config = DatabaseConfig::new().directory(dir.path());
    {
        let db = Database::open("people", config.clone()).unwrap();
        db.save(&sample_document("scott")).unwrap();
        let gone = Document::with_id("gone");
        db.save(&gone).unwrap();
        db.delete(&gone).unwrap();
        db.close().unwrap();
    }

    let db = Database::open("people", config).unwrap();
    assert_eq!(db.count(), 1);
    assert_eq!(db.last_sequence(), 3);
    assert!(db.get_document("gone").unwrap().is_none());

    let loaded = db.get_document("scott").unwrap().unwrap();
    let expected = sample_document("scott");
    assert_eq!(loaded.to_dictionary(), expected.to_dictionary());
    assert_eq!(loaded.get_string("name").as_deref(), Some("Scott"));
    assert_eq!(loaded.get_int("age"), 42);
    assert_eq!(loaded.get_double("ratio"), 0.25);
    assert!(loaded.get_boolean("active"));
    assert_eq!(
        loaded.get_date("born"),
        Some(Timestamp::from_millis(1_234_567_890_000))
    );
    assert_eq!(
        loaded
            .get_dictionary("address")
            .unwrap()
            .get_string("street"),
        Some("1 Main St.")
    );
    assert_eq!(
        loaded.get_array("phones").unwrap().get_string(1),
        Some("650-123-0002")
    );
}

#[test]
fn second_handle_is_locked_out() {
    let dir = tempdir().unwrap();
    let config = DatabaseConfig::new().directory(dir.path());
    let _first = Database::open("locked", config.clone()).unwrap();
    assert!(matches!(
        Database::open("locked", config),
        Err(CoreError::DatabaseLocked)
    ));
}

#[test]
fn missing_database_is_not_created_on_request() {
    let dir = tempdir().unwrap();
    let config = DatabaseConfig::new()
        .directory(dir.path())
        .create_if_missing(false);
    assert!(matches!(
        Database::open("absent", config),
        Err(CoreError::DatabaseMissing { .. })
    ));
}

#[test]
fn torn_tail_is_discarded_on_open() {
    let backend = InMemoryBackend::new();
    {
        let db = Database::open_with_backend(
            "torn",
            DatabaseConfig::default(),
            Box::new(backend.clone()),
        )
        .unwrap();
        db.save(&sample_document("kept")).unwrap();
    }
    let intact = backend.snapshot().len() as u64;
    {
        let mut writer = backend.clone();
        writer.append(b"DJRN\x00\x01\x02\xff").unwrap();
    }

    let db =
        Database::open_with_backend("torn", DatabaseConfig::default(), Box::new(backend.clone()))
            .unwrap();
    assert_eq!(db.count(), 1);
    assert_eq!(backend.snapshot().len() as u64, intact);
}

#[test]
fn corrupted_journal_refuses_to_open() {
    let backend = InMemoryBackend::new();
    {
        let db = Database::open_with_backend(
            "corrupt",
            DatabaseConfig::default(),
            Box::new(backend.clone()),
        )
        .unwrap();
        db.save(&sample_document("a")).unwrap();
    }
    let len = backend.snapshot().len();
    assert!(backend.corrupt_byte(len - 10, 0x5a));

    let err = Database::open_with_backend("corrupt", DatabaseConfig::default(), Box::new(backend))
        .unwrap_err();
    assert!(err.is_io());
}

#[test]
fn torn_append_leaves_nothing_behind() {
    let (backend, plan) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
    let db =
        Database::open_with_backend("tear", DatabaseConfig::default(), Box::new(backend)).unwrap();
    let doc = sample_document("doc");
    db.save(&doc).unwrap();
    let size = db.journal_size().unwrap();

    plan.tear_appends(true);
    doc.set("age", 43);
    let err = db.save(&doc).unwrap_err();
    assert!(matches!(err, CoreError::SaveFailed { ref doc_id, .. } if doc_id == "doc"));
    assert_eq!(db.journal_size().unwrap(), size);
    assert_eq!(db.get_document("doc").unwrap().unwrap().get_int("age"), 42);
}

#[test]
fn disk_full_fails_every_write_until_healed() {
    let (backend, plan) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
    let db =
        Database::open_with_backend("full", DatabaseConfig::default(), Box::new(backend)).unwrap();
    plan.fail_after_appends(3);

    let mut saved = 0;
    let mut failed = Vec::new();
    for i in 0..6 {
        match db.save(&Document::with_id(format!("d{i}"))) {
            Ok(_) => saved += 1,
            Err(err) => failed.push(err),
        }
    }
    assert_eq!(saved, 3);
    assert_eq!(failed.len(), 3);
    assert!(failed.iter().all(CoreError::is_io));
    assert_eq!(db.count(), 3);
    assert!(plan.injected_count() >= 3);

    plan.heal();
    db.save(&Document::with_id("after")).unwrap();
    assert_eq!(db.count(), 4);
    assert_eq!(db.last_sequence(), 4);
}

#[test]
fn failed_sync_rolls_back_the_commit() {
    let (backend, plan) = FaultyBackend::new(Box::new(InMemoryBackend::new()));
    let db =
        Database::open_with_backend("sync", DatabaseConfig::default(), Box::new(backend)).unwrap();
    plan.fail_syncs(true);
    assert!(db.save(&Document::with_id("a")).is_err());
    assert_eq!(db.count(), 0);
    assert_eq!(db.last_sequence(), 0);
}

#[test]
fn compaction_preserves_content_and_shrinks_journal() {
    let dir = tempdir().unwrap();
    let config = DatabaseConfig::new().directory(dir.path());
    {
        let db = Database::open("compact", config.clone()).unwrap();
        let doc = sample_document("hot");
        for i in 0..50 {
            doc.set("age", i);
            db.save(&doc).unwrap();
        }
        let cold = Document::with_id("cold");
        db.save(&cold).unwrap();
        db.delete(&cold).unwrap();

        let stats = db.compact().unwrap();
        assert_eq!(stats.records, 2);
        assert!(stats.bytes_after < stats.bytes_before);
        assert_eq!(db.journal_size().unwrap(), stats.bytes_after);

        // Writes after compaction append to the new journal.
        doc.set("age", 99);
        db.save(&doc).unwrap();
    }

    let db = Database::open("compact", config).unwrap();
    assert_eq!(db.count(), 1);
    assert_eq!(db.last_sequence(), 53);
    let hot = db.get_document("hot").unwrap().unwrap();
    assert_eq!(hot.get_int("age"), 99);
    assert_eq!(hot.revision_id().unwrap().generation(), 51);
    assert!(db.revision("cold").unwrap().unwrap().deleted);
}
