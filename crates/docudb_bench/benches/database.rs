//! Database operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docudb_bench::{populate, random_body};
use docudb_core::{ConcurrencyControl, Database, DatabaseConfig, Document};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

/// Benchmark saving new documents of growing size.
fn bench_single_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_save");

    for fields in [4, 16, 64].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(fields), fields, |b, &fields| {
            let db = Database::open_in_memory("bench").unwrap();
            let body = random_body(fields, 16);
            let mut n = 0usize;

            b.iter(|| {
                n += 1;
                let doc = Document::with_data(format!("doc-{n}"), body.clone());
                black_box(db.save(&doc).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark repeated updates of one document.
fn bench_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("update");

    for control in [ConcurrencyControl::LastWriteWins, ConcurrencyControl::FailOnConflict] {
        group.bench_function(format!("{control:?}"), |b| {
            let db = Database::open_in_memory("bench").unwrap();
            let doc = Document::with_id("doc");
            db.save(&doc).unwrap();
            let mut n = 0i64;

            b.iter(|| {
                n += 1;
                doc.set("n", n);
                black_box(db.save_with_concurrency_control(&doc, control).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark reads from a populated database.
fn bench_get_populated(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_populated");

    for count in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let db = Database::open_in_memory("bench").unwrap();
            let ids = populate(&db, count, 8);
            let mut rng = rand::thread_rng();

            b.iter(|| {
                let id = &ids[rng.gen_range(0..ids.len())];
                black_box(db.get_document(black_box(id)).unwrap());
            });
        });
    }
    group.finish();
}

/// Benchmark document deletion.
fn bench_delete(c: &mut Criterion) {
    c.bench_function("delete", |b| {
        let db = Database::open_in_memory("bench").unwrap();
        let mut n = 0usize;

        b.iter_batched(
            || {
                n += 1;
                let doc = Document::with_data(format!("doc-{n}"), random_body(8, 16));
                db.save(&doc).unwrap();
                doc
            },
            |doc| {
                db.delete(black_box(&doc)).unwrap();
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

/// Benchmark saves racing from several threads on the same documents.
fn bench_concurrent_saves(c: &mut Criterion) {
    let mut group = c.benchmark_group("concurrent_saves");
    const SAVES_PER_THREAD: usize = 50;

    for threads in [2, 4, 8].iter() {
        group.throughput(Throughput::Elements((threads * SAVES_PER_THREAD) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(threads), threads, |b, &threads| {
            let db = Arc::new(Database::open_in_memory("bench").unwrap());
            let ids = Arc::new(populate(&db, 10, 8));
            let counter = Arc::new(AtomicUsize::new(0));

            b.iter(|| {
                let handles: Vec<_> = (0..threads)
                    .map(|_| {
                        let db = Arc::clone(&db);
                        let ids = Arc::clone(&ids);
                        let counter = Arc::clone(&counter);
                        thread::spawn(move || {
                            for _ in 0..SAVES_PER_THREAD {
                                let n = counter.fetch_add(1, Ordering::Relaxed);
                                let doc = db.get_document(&ids[n % ids.len()]).unwrap().unwrap();
                                doc.set("n", n as i64);
                                db.save(&doc).unwrap();
                            }
                        })
                    })
                    .collect();
                for handle in handles {
                    handle.join().unwrap();
                }
            });
        });
    }
    group.finish();
}

/// Benchmark journal compaction on disk.
fn bench_compact(c: &mut Criterion) {
    c.bench_function("compact_1000_updates", |b| {
        let dir = tempfile::tempdir().unwrap();
        let config = DatabaseConfig::new()
            .directory(dir.path())
            .sync_on_commit(false);
        let db = Database::open("bench", config).unwrap();
        let ids = populate(&db, 100, 8);

        b.iter_batched(
            || {
                for (i, id) in ids.iter().cycle().take(1000).enumerate() {
                    let doc = db.get_document(id).unwrap().unwrap();
                    doc.set("n", i as i64);
                    db.save(&doc).unwrap();
                }
            },
            |()| black_box(db.compact().unwrap()),
            criterion::BatchSize::PerIteration,
        );
    });
}

criterion_group!(
    benches,
    bench_single_save,
    bench_update,
    bench_get_populated,
    bench_delete,
    bench_concurrent_saves,
    bench_compact,
);

criterion_main!(benches);
