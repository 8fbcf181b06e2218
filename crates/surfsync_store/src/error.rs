//! Error types for the stores.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors returned by the stores.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No block is stored under the hash.
    #[error("block not found: {0}")]
    BlockNotFound(String),

    /// The metadata record is malformed.
    #[error("invalid metadata for {filename}: {reason}")]
    InvalidMetadata {
        /// Offending filename.
        filename: String,
        /// Why it was rejected.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::BlockNotFound("abc".into());
        assert_eq!(err.to_string(), "block not found: abc");

        let err = StoreError::InvalidMetadata {
            filename: "a.txt".into(),
            reason: "version 0".into(),
        };
        assert!(err.to_string().contains("a.txt"));
    }
}
