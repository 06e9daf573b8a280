//! CLI command implementations.

pub mod changes;
pub mod compact;
pub mod get;
pub mod info;
pub mod replicate;

use docudb_core::{Array, CoreError, Dictionary, Value};
use docudb_sync_engine::SyncError;
use serde_json::{Map, Number};
use thiserror::Error;

/// Errors reported by the CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// No `--path` was given.
    #[error("database path required (use --path)")]
    MissingPath,

    /// The requested document does not exist.
    #[error("document {0:?} not found")]
    NotFound(String),

    /// Database error.
    #[error(transparent)]
    Database(#[from] CoreError),

    /// The replicator could not be started.
    #[error("replication failed: {0}")]
    Replication(#[from] SyncError),

    /// The replicator stopped with an error.
    #[error("replication stopped: {0}")]
    Stopped(String),

    /// Writing output failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON encoding failed.
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

/// Result type for commands.
pub type CliResult<T> = Result<T, CliError>;

/// Converts a document value to plain JSON. Dates become ISO-8601 strings
/// and non-finite floats become `null`.
pub fn to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Bool(b) => serde_json::Value::Bool(*b),
        Value::Integer(i) => serde_json::Value::from(*i),
        Value::Float(f) => Number::from_f64(*f).map_or(serde_json::Value::Null, Into::into),
        Value::String(s) => serde_json::Value::String(s.clone()),
        Value::Date(t) => serde_json::Value::String(t.to_string()),
        Value::Dictionary(d) => dictionary_to_json(d),
        Value::Array(a) => array_to_json(a),
    }
}

/// Converts a dictionary to a JSON object.
pub fn dictionary_to_json(dict: &Dictionary) -> serde_json::Value {
    let map: Map<String, serde_json::Value> = dict
        .iter()
        .map(|(key, value)| (key.to_string(), to_json(value)))
        .collect();
    serde_json::Value::Object(map)
}

fn array_to_json(array: &Array) -> serde_json::Value {
    serde_json::Value::Array(array.iter().map(to_json).collect())
}
