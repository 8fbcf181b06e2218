//! Error types for the server.

use thiserror::Error;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

/// Errors that can occur in the server.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Protocol error (encoding or framing).
    #[error("protocol error: {0}")]
    Protocol(#[from] surfsync_protocol::ProtocolError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),
}
