//! Benchmark utilities.

use docudb_core::{Database, Dictionary, Document};
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Generates a body of `fields` random string fields, each `width` chars.
pub fn random_body(fields: usize, width: usize) -> Dictionary {
    let mut rng = rand::thread_rng();
    (0..fields)
        .map(|i| {
            let value: String = (&mut rng)
                .sample_iter(&Alphanumeric)
                .take(width)
                .map(char::from)
                .collect();
            (format!("field{i}"), value)
        })
        .collect()
}

/// Saves `count` documents `bench-{i}` with random bodies.
pub fn populate(db: &Database, count: usize, fields: usize) -> Vec<String> {
    (0..count)
        .map(|i| {
            let id = format!("bench-{i}");
            let doc = Document::with_data(id.clone(), random_body(fields, 16));
            db.save(&doc).expect("Failed to save document");
            id
        })
        .collect()
}
