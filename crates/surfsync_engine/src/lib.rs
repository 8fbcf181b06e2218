//! # surfsync engine
//!
//! Client side of surfsync: keeps a local directory in step with the
//! metadata and block services.
//!
//! This crate provides:
//! - Block chunking and directory scanning
//! - The local index snapshot and directory lock
//! - Client traits for the two services, with a TCP stub and an
//!   in-process backend
//! - The sync engine itself
//!
//! ## Reconciliation
//!
//! Each pass diffs the directory against the index, fetches the server
//! map once and reconciles file by file:
//!
//! | Local vs server version | Locally changed | Outcome |
//! |---|---|---|
//! | equal | no | keep |
//! | equal | yes | push at server + 1 |
//! | local ahead | any | push as-is |
//! | local behind | any | pull, local edit is lost |
//! | server only | n/a | pull |
//! | local only | n/a | push |
//!
//! A push rejected with a version conflict falls back to a pull.
//!
//! ## Key Invariants
//!
//! - The server is authoritative on any version gap
//! - A pass with no changes makes exactly one RPC and rewrites nothing
//! - A failed download never leaves a partial file under the real name

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

mod client;
mod config;
mod engine;
mod error;
mod index;
mod remote;
mod rpc;
mod scan;

pub use client::{BlockStoreClient, MetaStoreClient};
pub use config::{SyncConfig, DEFAULT_INDEX_FILE, DEFAULT_RPC_TIMEOUT};
pub use engine::{SyncEngine, SyncReport, SyncState, SyncStats};
pub use error::{SyncError, SyncResult};
pub use index::{load_index, parse_index, render_index, save_index, DirLock};
pub use remote::{InProcessRemote, RpcCounters};
pub use rpc::{RemoteStub, RpcClient, TcpRpcClient};
pub use scan::{
    chunk_reader, fingerprint, is_reserved, read_blocks, scan_directory, DirectoryScan,
    LocalFiles, LOCK_FILE_NAME, MAX_NAME_LEN, PART_SUFFIX,
};
