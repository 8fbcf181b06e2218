//! In-process service backend.
//!
//! [`InProcessRemote`] serves both client traits directly from a pair of
//! stores, counting every call. Tests use the counters to assert how much
//! traffic a sync pass generated.

use crate::client::{BlockStoreClient, MetaStoreClient};
use crate::error::SyncResult;
use parking_lot::Mutex;
use std::sync::Arc;
use surfsync_protocol::{Block, FileInfoMap, FileMetaData, UpdateOutcome};
use surfsync_store::{BlockStore, MetaStore};

/// Per-operation call counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RpcCounters {
    /// `GetFileInfoMap` calls.
    pub get_file_info_map: u64,
    /// `UpdateFile` calls.
    pub update_file: u64,
    /// `GetBlockStoreAddr` calls.
    pub get_block_store_addr: u64,
    /// `GetBlock` calls.
    pub get_block: u64,
    /// `PutBlock` calls.
    pub put_block: u64,
    /// `HasBlocks` calls.
    pub has_blocks: u64,
}

impl RpcCounters {
    /// Total calls across all operations.
    pub fn total(&self) -> u64 {
        self.get_file_info_map
            + self.update_file
            + self.get_block_store_addr
            + self.get_block
            + self.put_block
            + self.has_blocks
    }
}

/// Both services backed by in-memory stores in the current process.
///
/// Cloning shares the stores and counters, so several engines can sync
/// against the same "server".
#[derive(Debug, Clone)]
pub struct InProcessRemote {
    block_store: Arc<BlockStore>,
    meta_store: Arc<MetaStore>,
    counters: Arc<Mutex<RpcCounters>>,
}

impl InProcessRemote {
    /// Creates a fresh pair of empty stores.
    pub fn new() -> Self {
        Self::with_stores(
            Arc::new(BlockStore::new()),
            Arc::new(MetaStore::new("in-process")),
        )
    }

    /// Wraps existing stores.
    pub fn with_stores(block_store: Arc<BlockStore>, meta_store: Arc<MetaStore>) -> Self {
        Self {
            block_store,
            meta_store,
            counters: Arc::new(Mutex::new(RpcCounters::default())),
        }
    }

    /// Returns the underlying block store.
    pub fn block_store(&self) -> &Arc<BlockStore> {
        &self.block_store
    }

    /// Returns the underlying metadata store.
    pub fn meta_store(&self) -> &Arc<MetaStore> {
        &self.meta_store
    }

    /// Returns a snapshot of the call counters.
    pub fn counters(&self) -> RpcCounters {
        *self.counters.lock()
    }

    /// Resets all call counters to zero.
    pub fn reset_counters(&self) {
        *self.counters.lock() = RpcCounters::default();
    }

    fn count(&self, f: impl FnOnce(&mut RpcCounters)) {
        f(&mut self.counters.lock());
    }
}

impl Default for InProcessRemote {
    fn default() -> Self {
        Self::new()
    }
}

impl MetaStoreClient for InProcessRemote {
    fn get_file_info_map(&self) -> SyncResult<FileInfoMap> {
        self.count(|c| c.get_file_info_map += 1);
        Ok(self.meta_store.file_info_map())
    }

    fn update_file(&self, meta: &FileMetaData) -> SyncResult<UpdateOutcome> {
        self.count(|c| c.update_file += 1);
        Ok(self.meta_store.update_file(meta.clone())?)
    }

    fn get_block_store_addr(&self) -> SyncResult<String> {
        self.count(|c| c.get_block_store_addr += 1);
        Ok(self.meta_store.block_store_addr().to_string())
    }
}

impl BlockStoreClient for InProcessRemote {
    fn get_block(&self, _addr: &str, hash: &str) -> SyncResult<Block> {
        self.count(|c| c.get_block += 1);
        Ok(self.block_store.get(hash)?)
    }

    fn put_block(&self, _addr: &str, block: &Block) -> SyncResult<bool> {
        self.count(|c| c.put_block += 1);
        self.block_store.put(block.clone());
        Ok(true)
    }

    fn has_blocks(&self, _addr: &str, hashes: &[String]) -> SyncResult<Vec<String>> {
        self.count(|c| c.has_blocks += 1);
        Ok(self.block_store.has_blocks(hashes))
    }
}
