//! # DocuDB Sync Server
//!
//! Hosts named DocuDB databases and serves the replication protocol for
//! them, so replicators can use it as a remote endpoint.
//!
//! This crate provides:
//! - Database provisioning (`PUT`/`GET`/`DELETE /{db}/`) from a JSON policy
//! - The sync endpoints: handshake, changes, revs-diff, fetch and push
//! - Guest access and HMAC-SHA256 bearer tokens
//!
//! # Authentication
//!
//! A database whose policy enables the `GUEST` user accepts handshakes
//! without a token. Otherwise clients present a token issued by the
//! server:
//!
//! ```rust
//! use docudb_sync_server::{ServerConfig, SyncServer};
//!
//! let server = SyncServer::new(ServerConfig::default().with_auth(b"k3y".to_vec()));
//! let token = server.create_token("pupshaw", "travel").unwrap();
//! assert!(token.starts_with("pupshaw:travel:"));
//! ```
//!
//! # Transport
//!
//! [`SyncServer`] implements the engine's `LoopbackServer`, so a
//! `LoopbackClient` can carry replicator traffic to it in-process.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod auth;
mod config;
mod error;
mod handler;
mod provision;
mod server;

pub use auth::{AuthConfig, TokenValidator};
pub use config::ServerConfig;
pub use error::{ServerError, ServerResult};
pub use handler::{DatabaseInfo, HandlerContext, HostedDatabase, RequestHandler};
pub use provision::{DatabasePolicy, UserPolicy, GUEST};
pub use server::SyncServer;
