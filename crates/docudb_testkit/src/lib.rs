//! # DocuDB Testkit
//!
//! Test utilities for DocuDB.
//!
//! This crate provides:
//! - Test fixtures, sample documents and database helpers
//! - Property-based test generators using proptest
//! - Multi-threaded stress helpers
//! - Helpers for replication tests across several databases
//!
//! ## Usage
//!
//! ```rust
//! use docudb_testkit::prelude::*;
//!
//! with_temp_db(|db| {
//!     let ids = create_docs(db, "sample", 3);
//!     assert_eq!(ids.len(), 3);
//!     assert_eq!(db.count(), 3);
//! });
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;
pub mod integration;
pub mod stress;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
    pub use crate::integration::*;
    pub use crate::stress::*;
}

pub use fixtures::*;
pub use generators::*;
pub use integration::*;
pub use stress::*;
