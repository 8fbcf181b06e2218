//! Authoritative file metadata store.

use crate::error::{StoreError, StoreResult};
use parking_lot::Mutex;
use surfsync_protocol::{FileInfoMap, FileMetaData, UpdateOutcome};
use tracing::{debug, info};

/// In-memory registry of file metadata with optimistic concurrency control.
///
/// # Invariants
///
/// - The first update for a filename is accepted at the version it carries.
/// - Afterwards an update is accepted only if its version is exactly one
///   greater than the stored version.
/// - Entries are never removed; deletion is a tombstone record.
/// - Re-deleting a tombstoned file is acknowledged without a version bump.
#[derive(Debug)]
pub struct MetaStore {
    files: Mutex<FileInfoMap>,
    block_store_addr: String,
}

impl MetaStore {
    /// Creates an empty metadata store backed by the given block store.
    pub fn new(block_store_addr: impl Into<String>) -> Self {
        let block_store_addr = block_store_addr.into();
        info!(block_store_addr = %block_store_addr, "metadata store created");
        Self {
            files: Mutex::new(FileInfoMap::new()),
            block_store_addr,
        }
    }

    /// Returns a snapshot of all file metadata.
    pub fn file_info_map(&self) -> FileInfoMap {
        self.files.lock().clone()
    }

    /// Returns the metadata of one file.
    pub fn get(&self, filename: &str) -> Option<FileMetaData> {
        self.files.lock().get(filename).cloned()
    }

    /// Submits new metadata for a file.
    ///
    /// A version mismatch is reported as [`UpdateOutcome::Conflict`], not as
    /// an error; the caller is expected to re-read and reconcile.
    pub fn update_file(&self, candidate: FileMetaData) -> StoreResult<UpdateOutcome> {
        validate(&candidate)?;

        let mut files = self.files.lock();
        let outcome = match files.get(&candidate.filename) {
            None => {
                let version = candidate.version;
                files.insert(candidate.filename.clone(), candidate.clone());
                UpdateOutcome::Accepted(version)
            }
            Some(current) if current.is_tombstone() && candidate.is_tombstone() => {
                UpdateOutcome::Accepted(current.version)
            }
            Some(current) if candidate.version == current.version + 1 => {
                let version = candidate.version;
                files.insert(candidate.filename.clone(), candidate.clone());
                UpdateOutcome::Accepted(version)
            }
            Some(current) => UpdateOutcome::Conflict {
                current_version: current.version,
            },
        };

        debug!(
            filename = %candidate.filename,
            version = candidate.version,
            ?outcome,
            "update file"
        );
        Ok(outcome)
    }

    /// Returns the address of the block store holding this domain's blocks.
    pub fn block_store_addr(&self) -> &str {
        &self.block_store_addr
    }
}

fn validate(candidate: &FileMetaData) -> StoreResult<()> {
    let reason = if candidate.filename.is_empty() {
        "empty filename"
    } else if candidate.version == 0 {
        "version must be at least 1"
    } else if candidate.block_hash_list.is_empty() {
        "empty block hash list"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidMetadata {
        filename: candidate.filename.clone(),
        reason: reason.to_string(),
    })
}
