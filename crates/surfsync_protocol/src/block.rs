//! Content-addressed blocks.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Computes the content hash of a block: SHA-256, lowercase hex.
pub fn block_hash(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

/// An immutable chunk of file content, identified by its hash.
///
/// `hash` is always the digest of `data`; two blocks with the same hash
/// carry the same bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Content hash of `data`.
    pub hash: String,
    /// Block bytes.
    pub data: Bytes,
    /// Length of `data` in bytes.
    pub size: u64,
}

impl Block {
    /// Creates a block from its bytes, computing the hash.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        Self {
            hash: block_hash(&data),
            size: data.len() as u64,
            data,
        }
    }

    /// Returns true if `hash` matches the digest of `data`.
    pub fn verify(&self) -> bool {
        self.hash == block_hash(&self.data)
    }
}
