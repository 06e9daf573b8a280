//! Stress tests for DocuDB.
//!
//! These helpers drive a database from many threads at once, the way the
//! concurrency tests do, and report how many operations went through.

use crate::fixtures::{create_document, doc_id, update_document};
use docudb_core::{ConcurrencyControl, CoreError, Database, Document};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of concurrent threads.
    pub threads: usize,
    /// Operations each thread performs.
    pub iterations: usize,
    /// Number of distinct documents.
    pub doc_count: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            threads: 10,
            iterations: 20,
            doc_count: 10,
        }
    }
}

impl StressConfig {
    /// Total operations the run will attempt.
    pub fn total_operations(&self) -> usize {
        self.threads * self.iterations
    }
}

/// Runs `work(thread, iteration)` on `config.threads` threads and tallies
/// the outcomes.
fn run_threads<F>(config: &StressConfig, work: F) -> StressTestResult
where
    F: Fn(usize, usize) -> Result<(), CoreError> + Send + Sync + 'static,
{
    let work = Arc::new(work);
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let work = Arc::clone(&work);
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let iterations = config.iterations;

            thread::Builder::new()
                .name(format!("stress-{t}"))
                .spawn(move || {
                    for i in 0..iterations {
                        match work(t, i) {
                            Ok(()) => successful.fetch_add(1, Ordering::Relaxed),
                            Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                        };
                    }
                })
                .expect("Failed to spawn stress thread")
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}

/// Saves `doc_count` sample documents.
pub fn populate(db: &Database, doc_count: usize) -> Vec<String> {
    (0..doc_count)
        .map(|i| {
            db.save(&create_document(i)).expect("Failed to save document");
            doc_id(i)
        })
        .collect()
}

/// Every thread saves its own fresh documents.
pub fn stress_concurrent_creates(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    let iterations = config.iterations;
    run_threads(config, move |t, i| {
        db.save(&create_document(t * iterations + i)).map(|_| ())
    })
}

/// Every thread reads back the shared documents.
pub fn stress_concurrent_reads(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    populate(&db, config.doc_count);
    let doc_count = config.doc_count;
    run_threads(config, move |t, i| {
        let id = doc_id((t + i) % doc_count);
        match db.get_document(&id)? {
            Some(_) => Ok(()),
            None => Err(CoreError::not_found(id)),
        }
    })
}

/// Every thread updates the shared documents, last write wins.
pub fn stress_concurrent_updates(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    populate(&db, config.doc_count);
    let doc_count = config.doc_count;
    let iterations = config.iterations;
    run_threads(config, move |t, i| {
        let id = doc_id((t + i) % doc_count);
        let doc = db
            .get_document(&id)?
            .ok_or_else(|| CoreError::not_found(id.as_str()))?;
        update_document(&doc, t * iterations + i);
        db.save(&doc).map(|_| ())
    })
}

/// Every thread updates the shared documents and fails on stale bases.
///
/// Failed operations are conflicts; the store must stay consistent anyway.
pub fn stress_conflicting_updates(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    populate(&db, config.doc_count);
    let doc_count = config.doc_count;
    let iterations = config.iterations;
    run_threads(config, move |t, i| {
        let id = doc_id(i % doc_count);
        let doc = db
            .get_document(&id)?
            .ok_or_else(|| CoreError::not_found(id.as_str()))?;
        update_document(&doc, t * iterations + i);
        db.save_with_concurrency_control(&doc, ConcurrencyControl::FailOnConflict)
            .map(|_| ())
    })
}

/// Threads share one document handle, mutating and saving it.
pub fn stress_shared_handle(db: Arc<Database>, config: &StressConfig) -> StressTestResult {
    let shared: Document = create_document(0);
    db.save(&shared).expect("Failed to save document");
    let iterations = config.iterations;
    run_threads(config, move |t, i| {
        update_document(&shared, t * iterations + i);
        db.save(&shared).map(|_| ())
    })
}
