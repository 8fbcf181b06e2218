//! Client interfaces to the metadata and block services.
//!
//! The engine depends only on these two traits, so it can run against a
//! remote deployment ([`crate::RemoteStub`]) or an in-process one
//! ([`crate::InProcessRemote`]) without change.

use crate::error::SyncResult;
use surfsync_protocol::{Block, FileInfoMap, FileMetaData, UpdateOutcome};

/// Operations of the metadata service.
pub trait MetaStoreClient: Send + Sync {
    /// Fetches the full filename to metadata map.
    fn get_file_info_map(&self) -> SyncResult<FileInfoMap>;

    /// Submits new metadata for a file.
    ///
    /// A version conflict is an [`UpdateOutcome::Conflict`], not an error.
    fn update_file(&self, meta: &FileMetaData) -> SyncResult<UpdateOutcome>;

    /// Fetches the address of the block service.
    fn get_block_store_addr(&self) -> SyncResult<String>;
}

/// Operations of the block service at a given address.
pub trait BlockStoreClient: Send + Sync {
    /// Fetches a block by hash.
    fn get_block(&self, addr: &str, hash: &str) -> SyncResult<Block>;

    /// Stores a block. Returns whether the service reported success.
    fn put_block(&self, addr: &str, block: &Block) -> SyncResult<bool>;

    /// Returns the subset of `hashes` already stored.
    fn has_blocks(&self, addr: &str, hashes: &[String]) -> SyncResult<Vec<String>>;
}
