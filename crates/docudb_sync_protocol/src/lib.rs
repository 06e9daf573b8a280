//! # DocuDB Sync Protocol
//!
//! Replication messages and CBOR codecs for DocuDB.
//!
//! This crate provides:
//! - Handshake messages that open a replication session
//! - `Changes` for walking a peer's change feed
//! - `RevsDiff` for finding revisions the receiver is missing
//! - `Fetch` and `Push` for moving revision payloads
//! - CBOR encoding/decoding via [`WireMessage`]
//!
//! This is a pure protocol crate with no I/O operations. Revision ids
//! travel as their `"<generation>-<digest>"` text form so the protocol does
//! not depend on the storage engine.
//!
//! ## Replication Round
//!
//! ```text
//! source                                   target
//!   | -- HandshakeRequest ------------------> |
//!   | <------------------ HandshakeResponse -- |
//!   | -- RevsDiffRequest (changed revs) ----> |
//!   | <------------ RevsDiffResponse (missing) |
//!   | -- PushRequest (missing payloads) ----> |
//!   | <------------------------ PushResponse -- |
//! ```
//!
//! Pulling runs the same round in the other direction with
//! `ChangesRequest` and `FetchRequest`.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod messages;
mod revision;

pub use error::{ProtocolError, ProtocolResult};
pub use messages::{
    ChangesRequest, ChangesResponse, ErrorResponse, FetchRequest, FetchResponse,
    HandshakeRequest, HandshakeResponse, PushRequest, PushResponse, Rejection, RevsDiffRequest,
    RevsDiffResponse, SyncMessage, WireMessage,
};
pub use revision::{ChangeEntry, RevisionPayload, RevisionRef};

/// Current protocol version.
pub const PROTOCOL_VERSION: u16 = 1;
