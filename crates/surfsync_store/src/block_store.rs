//! Content-addressed block store.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use std::collections::HashMap;
use surfsync_protocol::{block_hash, Block};
use tracing::{debug, warn};

/// In-memory content-addressed block store.
///
/// Blocks are keyed by the digest of their data. Storing the same content
/// twice leaves the store unchanged.
#[derive(Debug, Default)]
pub struct BlockStore {
    blocks: Mutex<HashMap<String, Block>>,
}

impl BlockStore {
    /// Creates an empty block store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the block stored under `hash`.
    pub fn get(&self, hash: &str) -> StoreResult<Block> {
        self.blocks
            .lock()
            .get(hash)
            .cloned()
            .ok_or_else(|| StoreError::BlockNotFound(hash.to_string()))
    }

    /// Stores a block under the digest of its data.
    ///
    /// Returns the hash the block is stored under. A declared hash that does
    /// not match the data is ignored.
    pub fn put(&self, block: Block) -> String {
        let hash = block_hash(&block.data);
        if block.hash != hash {
            warn!(declared = %block.hash, computed = %hash, "block hash mismatch, storing under computed hash");
        }

        let mut blocks = self.blocks.lock();
        if !blocks.contains_key(&hash) {
            debug!(hash = %hash, size = block.data.len(), "stored block");
            let size = block.data.len() as u64;
            blocks.insert(
                hash.clone(),
                Block {
                    hash: hash.clone(),
                    data: block.data,
                    size,
                },
            );
        }
        hash
    }

    /// Returns the subset of `hashes` that are stored, in request order.
    pub fn has_blocks(&self, hashes: &[String]) -> Vec<String> {
        let blocks = self.blocks.lock();
        hashes
            .iter()
            .filter(|h| blocks.contains_key(h.as_str()))
            .cloned()
            .collect()
    }

    /// Returns the number of distinct blocks stored.
    pub fn len(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Returns true if no blocks are stored.
    pub fn is_empty(&self) -> bool {
        self.blocks.lock().is_empty()
    }
}
