//! # surfsync Protocol
//!
//! Wire types and codecs shared by the surfsync client and services.
//!
//! This crate provides:
//! - [`Block`] and block hashing (SHA-256, lowercase hex)
//! - [`FileMetaData`] and the tombstone sentinel
//! - RPC [`Request`] / [`Response`] messages with CBOR encoding
//! - Length-prefixed framing for stream transports
//!
//! This is a pure protocol crate: apart from framing over `Read`/`Write`
//! it performs no I/O.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod block;
mod error;
mod frame;
mod messages;
mod metadata;

pub use block::{block_hash, Block};
pub use error::{ProtocolError, ProtocolResult};
pub use frame::{read_frame, write_frame, DEFAULT_MAX_FRAME_SIZE};
pub use messages::{ErrorCode, Request, Response};
pub use metadata::{FileInfoMap, FileMetaData, UpdateOutcome, CONFLICT_VERSION, TOMBSTONE_HASH};
