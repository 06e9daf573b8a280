//! # DocuDB Sync Engine
//!
//! Replicator state machine and peer transports for DocuDB.
//!
//! This crate provides:
//! - [`Replicator`]: push, pull or push-and-pull replication, one-shot or
//!   continuous, on a background thread
//! - The activity state machine (stopped → connecting → busy ⇄ idle, with
//!   offline and retry) and progress reporting to listeners
//! - Retry with exponential backoff
//! - [`ReplicationPeer`] with an in-process [`LocalPeer`] and an HTTP
//!   [`RemotePeer`]
//! - HTTP client abstraction with an in-process [`LoopbackClient`]
//! - Persistent replication checkpoints
//!
//! ## Architecture
//!
//! Both directions run the same round: list changes after a checkpoint,
//! ask the receiving side which revisions it lacks, transfer only those,
//! then advance the checkpoint. The receiving database decides on its own
//! whether a revision inserts, fast-forwards or merges, so replicas converge
//! no matter which side replicates first.
//!
//! ## Key Invariants
//!
//! - Activity changes only through [`ActivityLevel::on`]
//! - `idle` is reported only when `completed == total`
//! - Progress counters never decrease within a run
//! - `stop()` never blocks; completion is a `stopped` status
//! - Revisions already known by the receiver are never transferred

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod error;
mod http;
mod peer;
mod replicator;
mod state;

pub use config::{Endpoint, ReplicatorConfiguration, ReplicatorType, RetryConfig};
pub use error::{SyncError, SyncResult};
pub use http::{HttpClient, HttpResponse, LoopbackClient, LoopbackServer, Method, RemotePeer};
pub use peer::{
    parse_refs, parse_revision, payload_to_record, record_to_payload, LocalPeer,
    ReplicationPeer, WatchCallback,
};
pub use replicator::Replicator;
pub use state::{ActivityEvent, ActivityLevel, Progress, ReplicatorStatus};
