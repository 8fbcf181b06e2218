//! Error types for the sync engine.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur during sync operations.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The block service has no block under the hash.
    #[error("block not found: {hash}")]
    BlockNotFound {
        /// Missing block hash.
        hash: String,
    },

    /// Network or transport error.
    #[error("transport error: {message}")]
    Transport {
        /// Error message.
        message: String,
        /// Whether the operation can be retried.
        retryable: bool,
    },

    /// An RPC did not complete within its deadline.
    #[error("operation timed out")]
    Timeout,

    /// The server could not be reached.
    #[error("not connected to server")]
    NotConnected,

    /// Local filesystem error.
    #[error("io error on {path}: {source}")]
    Io {
        /// Path being accessed.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// Protocol error (invalid or unexpected message).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// The server rejected the request.
    #[error("server error: {0}")]
    Server(String),

    /// The index snapshot could not be parsed.
    #[error("corrupt index at line {line}: {message}")]
    CorruptIndex {
        /// 1-based line number.
        line: usize,
        /// What was wrong.
        message: String,
    },

    /// A file changed between scanning and uploading.
    #[error("file changed during sync: {filename}")]
    FileChanged {
        /// Affected file.
        filename: String,
    },

    /// A downloaded block did not match its hash.
    #[error("block hash mismatch: expected {expected}, got {actual}")]
    BlockMismatch {
        /// Requested hash.
        expected: String,
        /// Digest of the received data.
        actual: String,
    },

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Another sync pass holds the directory lock.
    #[error("directory is locked by another sync pass: {0}")]
    DirectoryLocked(PathBuf),

    /// Invalid state transition.
    #[error("invalid state transition from {from:?} to {to:?}")]
    InvalidStateTransition {
        /// Current state.
        from: String,
        /// Attempted target state.
        to: String,
    },
}

impl SyncError {
    /// Creates a retryable transport error.
    pub fn transport_retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Creates a non-retryable transport error.
    pub fn transport_fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns true if this error can be retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Timeout | SyncError::NotConnected => true,
            _ => false,
        }
    }
}

impl From<surfsync_protocol::ProtocolError> for SyncError {
    fn from(err: surfsync_protocol::ProtocolError) -> Self {
        use surfsync_protocol::ProtocolError;
        if err.is_timeout() {
            return SyncError::Timeout;
        }
        match err {
            ProtocolError::Io(e) => SyncError::transport_retryable(e.to_string()),
            other => SyncError::Protocol(other.to_string()),
        }
    }
}

impl From<surfsync_store::StoreError> for SyncError {
    fn from(err: surfsync_store::StoreError) -> Self {
        match err {
            surfsync_store::StoreError::BlockNotFound(hash) => SyncError::BlockNotFound { hash },
            other => SyncError::Server(other.to_string()),
        }
    }
}
