//! RPC transport to remote services.
//!
//! Requests are CBOR-encoded [`Request`] frames sent over a pluggable
//! [`RpcClient`]. [`TcpRpcClient`] is the production implementation.

use crate::client::{BlockStoreClient, MetaStoreClient};
use crate::error::{SyncError, SyncResult};
use std::io::ErrorKind;
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;
use surfsync_protocol::{
    read_frame, write_frame, Block, ErrorCode, FileInfoMap, FileMetaData, Request, Response,
    UpdateOutcome, DEFAULT_MAX_FRAME_SIZE,
};
use tracing::{debug, trace};

/// Frame transport abstraction.
///
/// Implement this trait to carry request frames to a service address and
/// return the response frame. Implementations must enforce their own
/// deadline and report expiry as [`SyncError::Timeout`].
pub trait RpcClient: Send + Sync {
    /// Sends one request frame to `addr` and returns the response frame.
    fn call(&self, addr: &str, frame: Vec<u8>) -> SyncResult<Vec<u8>>;
}

/// TCP transport: one connection per call, bounded by a deadline.
#[derive(Debug, Clone)]
pub struct TcpRpcClient {
    timeout: Duration,
    max_frame_size: usize,
}

impl TcpRpcClient {
    /// Creates a TCP transport with the given per-call deadline.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sets the maximum accepted response frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    fn connect(&self, addr: &str) -> SyncResult<TcpStream> {
        let targets: Vec<SocketAddr> = addr
            .to_socket_addrs()
            .map_err(|e| SyncError::transport_fatal(format!("cannot resolve {addr}: {e}")))?
            .collect();

        let mut last_error = None;
        for target in targets {
            match TcpStream::connect_timeout(&target, self.timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = Some(e),
            }
        }
        Err(match last_error {
            Some(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => {
                SyncError::Timeout
            }
            Some(e) => {
                debug!(addr, error = %e, "connect failed");
                SyncError::NotConnected
            }
            None => SyncError::transport_fatal(format!("no addresses for {addr}")),
        })
    }
}

impl RpcClient for TcpRpcClient {
    fn call(&self, addr: &str, frame: Vec<u8>) -> SyncResult<Vec<u8>> {
        let mut stream = self.connect(addr)?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|_| stream.set_write_timeout(Some(self.timeout)))
            .and_then(|_| stream.set_nodelay(true))
            .map_err(io_to_sync)?;

        write_frame(&mut stream, &frame)?;
        let response = read_frame(&mut stream, self.max_frame_size)?;
        Ok(response)
    }
}

fn io_to_sync(err: std::io::Error) -> SyncError {
    match err.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock => SyncError::Timeout,
        _ => SyncError::transport_retryable(err.to_string()),
    }
}

/// Client stub for a remote deployment.
///
/// Metadata calls go to the configured metadata address; block calls go to
/// whatever address the metadata service advertises.
pub struct RemoteStub<C: RpcClient> {
    meta_addr: String,
    client: C,
}

impl<C: RpcClient> RemoteStub<C> {
    /// Creates a stub talking to the metadata service at `meta_addr`.
    pub fn new(meta_addr: impl Into<String>, client: C) -> Self {
        Self {
            meta_addr: meta_addr.into(),
            client,
        }
    }

    /// Returns the metadata service address.
    pub fn meta_addr(&self) -> &str {
        &self.meta_addr
    }

    fn call(&self, addr: &str, request: &Request) -> SyncResult<Response> {
        trace!(addr, method = request.method(), "rpc call");
        let frame = request.encode()?;
        let bytes = self.client.call(addr, frame)?;
        match Response::decode(&bytes)? {
            Response::Error { code, message } => Err(match code {
                ErrorCode::NotFound => match request {
                    Request::GetBlock { hash } => SyncError::BlockNotFound { hash: hash.clone() },
                    _ => SyncError::Server(message),
                },
                ErrorCode::InvalidRequest | ErrorCode::WrongService => {
                    SyncError::Protocol(message)
                }
                ErrorCode::Internal => SyncError::Server(message),
            }),
            response => Ok(response),
        }
    }
}

fn unexpected(method: &str, response: Response) -> SyncError {
    SyncError::Protocol(format!("unexpected response to {method}: {response:?}"))
}

impl<C: RpcClient> MetaStoreClient for RemoteStub<C> {
    fn get_file_info_map(&self) -> SyncResult<FileInfoMap> {
        match self.call(&self.meta_addr, &Request::GetFileInfoMap)? {
            Response::FileInfoMap { files } => Ok(files),
            other => Err(unexpected("GetFileInfoMap", other)),
        }
    }

    fn update_file(&self, meta: &FileMetaData) -> SyncResult<UpdateOutcome> {
        let request = Request::UpdateFile { meta: meta.clone() };
        match self.call(&self.meta_addr, &request)? {
            Response::UpdateFile {
                version,
                current_version,
            } => Ok(UpdateOutcome::from_wire(version, current_version)),
            other => Err(unexpected("UpdateFile", other)),
        }
    }

    fn get_block_store_addr(&self) -> SyncResult<String> {
        match self.call(&self.meta_addr, &Request::GetBlockStoreAddr)? {
            Response::BlockStoreAddr { addr } => Ok(addr),
            other => Err(unexpected("GetBlockStoreAddr", other)),
        }
    }
}

impl<C: RpcClient> BlockStoreClient for RemoteStub<C> {
    fn get_block(&self, addr: &str, hash: &str) -> SyncResult<Block> {
        let request = Request::GetBlock {
            hash: hash.to_string(),
        };
        match self.call(addr, &request)? {
            Response::Block { block } => Ok(block),
            other => Err(unexpected("GetBlock", other)),
        }
    }

    fn put_block(&self, addr: &str, block: &Block) -> SyncResult<bool> {
        let request = Request::PutBlock {
            block: block.clone(),
        };
        match self.call(addr, &request)? {
            Response::PutBlock { success } => Ok(success),
            other => Err(unexpected("PutBlock", other)),
        }
    }

    fn has_blocks(&self, addr: &str, hashes: &[String]) -> SyncResult<Vec<String>> {
        let request = Request::HasBlocks {
            hashes: hashes.to_vec(),
        };
        match self.call(addr, &request)? {
            Response::HasBlocks { hashes } => Ok(hashes),
            other => Err(unexpected("HasBlocks", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    /// Replays canned responses and records the addresses called.
    struct ScriptedClient {
        responses: Mutex<Vec<Response>>,
        calls: Mutex<Vec<(String, Request)>>,
    }

    impl ScriptedClient {
        fn new(mut responses: Vec<Response>) -> Self {
            responses.reverse();
            Self {
                responses: Mutex::new(responses),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl RpcClient for ScriptedClient {
        fn call(&self, addr: &str, frame: Vec<u8>) -> SyncResult<Vec<u8>> {
            let request = Request::decode(&frame).unwrap();
            self.calls.lock().push((addr.to_string(), request));
            let response = self
                .responses
                .lock()
                .pop()
                .ok_or_else(|| SyncError::transport_retryable("no scripted response"))?;
            Ok(response.encode().unwrap())
        }
    }

    #[test]
    fn meta_calls_use_meta_address() {
        let client = ScriptedClient::new(vec![
            Response::BlockStoreAddr {
                addr: "blocks:1".into(),
            },
            Response::FileInfoMap {
                files: FileInfoMap::new(),
            },
        ]);
        let stub = RemoteStub::new("meta:1", client);

        assert_eq!(stub.get_block_store_addr().unwrap(), "blocks:1");
        assert!(stub.get_file_info_map().unwrap().is_empty());

        let calls = stub.client.calls.lock();
        assert!(calls.iter().all(|(addr, _)| addr == "meta:1"));
    }

    #[test]
    fn block_calls_use_given_address() {
        let block = Block::new(b"abc".to_vec());
        let client = ScriptedClient::new(vec![
            Response::PutBlock { success: true },
            Response::HasBlocks {
                hashes: vec![block.hash.clone()],
            },
        ]);
        let stub = RemoteStub::new("meta:1", client);

        assert!(stub.put_block("blocks:9", &block).unwrap());
        let present = stub
            .has_blocks("blocks:9", &[block.hash.clone(), "other".into()])
            .unwrap();
        assert_eq!(present, vec![block.hash.clone()]);

        let calls = stub.client.calls.lock();
        assert!(calls.iter().all(|(addr, _)| addr == "blocks:9"));
    }

    #[test]
    fn conflict_is_an_outcome_not_an_error() {
        let client = ScriptedClient::new(vec![Response::UpdateFile {
            version: -1,
            current_version: 5,
        }]);
        let stub = RemoteStub::new("meta:1", client);
        let outcome = stub
            .update_file(&FileMetaData::new("a.txt", 3, vec!["h".into()]))
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::Conflict { current_version: 5 });
    }

    #[test]
    fn not_found_maps_to_block_not_found() {
        let client = ScriptedClient::new(vec![Response::error(ErrorCode::NotFound, "gone")]);
        let stub = RemoteStub::new("meta:1", client);
        let err = stub.get_block("blocks:1", "deadbeef").unwrap_err();
        assert!(matches!(err, SyncError::BlockNotFound { ref hash } if hash == "deadbeef"));
    }

    #[test]
    fn mismatched_response_is_protocol_error() {
        let client = ScriptedClient::new(vec![Response::PutBlock { success: true }]);
        let stub = RemoteStub::new("meta:1", client);
        assert!(matches!(
            stub.get_file_info_map(),
            Err(SyncError::Protocol(_))
        ));
    }

    #[test]
    fn unreachable_server_fails_fast() {
        // Reserve a port, then release it so nothing is listening there.
        let addr = {
            let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().to_string()
        };
        let stub = RemoteStub::new(addr, TcpRpcClient::new(Duration::from_millis(200)));
        let err = stub.get_file_info_map().unwrap_err();
        assert!(matches!(err, SyncError::NotConnected));
        assert!(err.is_retryable());
    }

    #[test]
    fn silent_server_times_out() {
        // Connections complete in the backlog but nothing ever answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let stub = RemoteStub::new(addr, TcpRpcClient::new(Duration::from_millis(200)));

        let start = std::time::Instant::now();
        let err = stub.get_file_info_map().unwrap_err();
        assert!(matches!(err, SyncError::Timeout), "got {err:?}");
        assert!(start.elapsed() >= Duration::from_millis(150));
        assert!(start.elapsed() < Duration::from_secs(2));
        drop(listener);
    }
}
