//! Error types for the protocol crate.

use thiserror::Error;

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors that can occur while encoding, decoding or framing messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    /// Failed to encode a message to CBOR.
    #[error("encoding failed: {0}")]
    Encode(String),

    /// Failed to decode a message from CBOR.
    #[error("decoding failed: {0}")]
    Decode(String),

    /// A frame exceeded the configured maximum size.
    #[error("frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge {
        /// Size announced by the frame header.
        size: usize,
        /// Maximum accepted size.
        limit: usize,
    },

    /// I/O error while reading or writing a frame.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProtocolError {
    /// Returns true if the underlying I/O error is a timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            ProtocolError::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
            ),
            _ => false,
        }
    }
}
