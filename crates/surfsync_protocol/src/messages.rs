//! RPC messages exchanged with the block and metadata services.

use crate::block::Block;
use crate::error::{ProtocolError, ProtocolResult};
use crate::metadata::{FileInfoMap, FileMetaData, UpdateOutcome};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A request to one of the two services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Request {
    /// Fetch a block by hash (block service).
    GetBlock {
        /// Block hash.
        hash: String,
    },
    /// Store a block (block service).
    PutBlock {
        /// Block to store.
        block: Block,
    },
    /// Ask which of the given hashes are stored (block service).
    HasBlocks {
        /// Candidate hashes.
        hashes: Vec<String>,
    },
    /// Fetch the full filename to metadata map (metadata service).
    GetFileInfoMap,
    /// Submit new metadata for a file (metadata service).
    UpdateFile {
        /// Candidate metadata.
        meta: FileMetaData,
    },
    /// Fetch the address of the block service (metadata service).
    GetBlockStoreAddr,
}

impl Request {
    /// Returns the RPC method name, for logging.
    pub fn method(&self) -> &'static str {
        match self {
            Request::GetBlock { .. } => "GetBlock",
            Request::PutBlock { .. } => "PutBlock",
            Request::HasBlocks { .. } => "HasBlocks",
            Request::GetFileInfoMap => "GetFileInfoMap",
            Request::UpdateFile { .. } => "UpdateFile",
            Request::GetBlockStoreAddr => "GetBlockStoreAddr",
        }
    }

    /// Returns true if the request targets the block service.
    pub fn is_block_request(&self) -> bool {
        matches!(
            self,
            Request::GetBlock { .. } | Request::PutBlock { .. } | Request::HasBlocks { .. }
        )
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

/// Classification of a failed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    /// The requested block does not exist.
    NotFound,
    /// The request could not be decoded or was malformed.
    InvalidRequest,
    /// The process does not host the addressed service.
    WrongService,
    /// Any other server-side failure.
    Internal,
}

/// A response from one of the two services.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Response {
    /// Reply to [`Request::GetBlock`].
    Block {
        /// The stored block.
        block: Block,
    },
    /// Reply to [`Request::PutBlock`].
    PutBlock {
        /// Whether the block was stored.
        success: bool,
    },
    /// Reply to [`Request::HasBlocks`].
    HasBlocks {
        /// Subset of the requested hashes that are stored.
        hashes: Vec<String>,
    },
    /// Reply to [`Request::GetFileInfoMap`].
    FileInfoMap {
        /// Snapshot of all file metadata.
        files: FileInfoMap,
    },
    /// Reply to [`Request::UpdateFile`].
    UpdateFile {
        /// Accepted version, or `-1` on a version conflict.
        version: i64,
        /// Version stored after the call.
        current_version: u64,
    },
    /// Reply to [`Request::GetBlockStoreAddr`].
    BlockStoreAddr {
        /// Address of the block service.
        addr: String,
    },
    /// The request failed.
    Error {
        /// Failure class.
        code: ErrorCode,
        /// Human-readable detail.
        message: String,
    },
}

impl Response {
    /// Creates an error response.
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Response::Error {
            code,
            message: message.into(),
        }
    }

    /// Creates the reply to an update.
    pub fn update(outcome: UpdateOutcome) -> Self {
        let current_version = match outcome {
            UpdateOutcome::Accepted(v) => v,
            UpdateOutcome::Conflict { current_version } => current_version,
        };
        Response::UpdateFile {
            version: outcome.wire_version(),
            current_version,
        }
    }

    /// Encodes to CBOR.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        encode_cbor(self)
    }

    /// Decodes from CBOR.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        decode_cbor(bytes)
    }
}

fn encode_cbor<T: Serialize>(value: &T) -> ProtocolResult<Vec<u8>> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf).map_err(|e| ProtocolError::Encode(e.to_string()))?;
    Ok(buf)
}

fn decode_cbor<T: DeserializeOwned>(bytes: &[u8]) -> ProtocolResult<T> {
    ciborium::from_reader(bytes).map_err(|e| ProtocolError::Decode(e.to_string()))
}
