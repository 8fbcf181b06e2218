//! File metadata records.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel hash list entry marking a deleted file.
pub const TOMBSTONE_HASH: &str = "0";

/// Version reported on the wire when an update is rejected.
pub const CONFLICT_VERSION: i64 = -1;

/// Mapping from filename to metadata, ordered by filename.
pub type FileInfoMap = BTreeMap<String, FileMetaData>;

/// Versioned metadata for one file.
///
/// Concatenating the blocks named by `block_hash_list`, in order,
/// reconstructs the file. A list consisting of the single entry
/// [`TOMBSTONE_HASH`] marks the file as deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetaData {
    /// File name relative to the synchronized directory.
    pub filename: String,
    /// Version, starting at 1 and incremented by one per accepted update.
    pub version: u64,
    /// Ordered block hashes.
    pub block_hash_list: Vec<String>,
}

impl FileMetaData {
    /// Creates a metadata record.
    pub fn new(filename: impl Into<String>, version: u64, block_hash_list: Vec<String>) -> Self {
        Self {
            filename: filename.into(),
            version,
            block_hash_list,
        }
    }

    /// Creates a tombstone record.
    pub fn tombstone(filename: impl Into<String>, version: u64) -> Self {
        Self::new(filename, version, vec![TOMBSTONE_HASH.to_string()])
    }

    /// Returns true if this record marks a deleted file.
    pub fn is_tombstone(&self) -> bool {
        self.block_hash_list.len() == 1 && self.block_hash_list[0] == TOMBSTONE_HASH
    }

    /// Returns true if both records describe the same content.
    pub fn same_content(&self, other: &FileMetaData) -> bool {
        self.block_hash_list == other.block_hash_list
    }

    /// Returns a copy carrying a different version.
    #[must_use]
    pub fn with_version(&self, version: u64) -> Self {
        Self {
            version,
            ..self.clone()
        }
    }
}

/// Result of submitting a metadata update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// The update was accepted at this version.
    Accepted(u64),
    /// The submitted version was not exactly one past the stored one.
    Conflict {
        /// Version currently stored by the metadata service.
        current_version: u64,
    },
}

impl UpdateOutcome {
    /// Returns true if the update was accepted.
    pub fn is_accepted(&self) -> bool {
        matches!(self, UpdateOutcome::Accepted(_))
    }

    /// Returns the version as sent on the wire (`-1` for a conflict).
    pub fn wire_version(&self) -> i64 {
        match self {
            UpdateOutcome::Accepted(v) => *v as i64,
            UpdateOutcome::Conflict { .. } => CONFLICT_VERSION,
        }
    }

    /// Rebuilds an outcome from its wire representation.
    pub fn from_wire(version: i64, current_version: u64) -> Self {
        if version < 0 {
            UpdateOutcome::Conflict { current_version }
        } else {
            UpdateOutcome::Accepted(version as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tombstone_detection() {
        let meta = FileMetaData::tombstone("a.txt", 3);
        assert!(meta.is_tombstone());
        assert_eq!(meta.version, 3);

        let meta = FileMetaData::new("a.txt", 1, vec!["0".into(), "abc".into()]);
        assert!(!meta.is_tombstone());

        let meta = FileMetaData::new("a.txt", 1, vec![]);
        assert!(!meta.is_tombstone());
    }

    #[test]
    fn same_content_ignores_version() {
        let a = FileMetaData::new("a.txt", 1, vec!["h1".into()]);
        let b = a.with_version(7);
        assert!(a.same_content(&b));
        assert_eq!(b.version, 7);
        assert_eq!(b.filename, "a.txt");
    }

    #[test]
    fn outcome_wire_mapping() {
        assert_eq!(UpdateOutcome::Accepted(4).wire_version(), 4);
        assert_eq!(
            UpdateOutcome::Conflict { current_version: 2 }.wire_version(),
            CONFLICT_VERSION
        );
        assert_eq!(
            UpdateOutcome::from_wire(-1, 2),
            UpdateOutcome::Conflict { current_version: 2 }
        );
        assert_eq!(UpdateOutcome::from_wire(5, 4), UpdateOutcome::Accepted(5));
    }
}
