//! # surfsync Store
//!
//! The two services behind a surfsync deployment:
//!
//! - [`BlockStore`]: content-addressed map from block hash to block bytes,
//!   deduplicating identical content across files and clients.
//! - [`MetaStore`]: authoritative map from filename to versioned metadata,
//!   accepting an update only when it advances the version by exactly one.
//!
//! ## Concurrency
//!
//! Each store owns a single mutex guarding its whole state; every operation
//! holds it for its full duration. The stores never call into each other,
//! so there is no lock ordering to respect.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod block_store;
mod error;
mod meta_store;

pub use block_store::BlockStore;
pub use error::{StoreError, StoreResult};
pub use meta_store::MetaStore;
