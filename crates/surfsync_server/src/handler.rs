//! Request dispatch onto the stores.

use crate::config::ServerConfig;
use std::sync::Arc;
use surfsync_protocol::{ErrorCode, Request, Response};
use surfsync_store::{BlockStore, MetaStore, StoreError};
use tracing::{debug, warn};

/// Dispatches requests to the stores hosted by this process.
pub struct RequestHandler {
    block_store: Option<Arc<BlockStore>>,
    meta_store: Option<Arc<MetaStore>>,
}

impl RequestHandler {
    /// Creates fresh stores according to the configured role.
    pub fn new(config: &ServerConfig) -> Self {
        let block_store = config
            .role
            .hosts_block()
            .then(|| Arc::new(BlockStore::new()));
        let meta_store = config
            .role
            .hosts_meta()
            .then(|| Arc::new(MetaStore::new(config.advertised_block_store_addr())));
        Self {
            block_store,
            meta_store,
        }
    }

    /// Creates a handler over existing stores.
    pub fn with_stores(
        block_store: Option<Arc<BlockStore>>,
        meta_store: Option<Arc<MetaStore>>,
    ) -> Self {
        Self {
            block_store,
            meta_store,
        }
    }

    /// Returns the hosted block store.
    pub fn block_store(&self) -> Option<&Arc<BlockStore>> {
        self.block_store.as_ref()
    }

    /// Returns the hosted metadata store.
    pub fn meta_store(&self) -> Option<&Arc<MetaStore>> {
        self.meta_store.as_ref()
    }

    /// Handles one decoded request.
    pub fn handle(&self, request: Request) -> Response {
        let method = request.method();
        let response = if request.is_block_request() {
            match &self.block_store {
                Some(store) => handle_block(store, request),
                None => wrong_service(method),
            }
        } else {
            match &self.meta_store {
                Some(store) => handle_meta(store, request),
                None => wrong_service(method),
            }
        };

        if let Response::Error { code, message } = &response {
            debug!(method, ?code, %message, "request failed");
        }
        response
    }

    /// Handles one encoded request frame and returns the encoded response.
    ///
    /// Undecodable requests are answered with an `InvalidRequest` error.
    pub fn handle_frame(&self, payload: &[u8]) -> surfsync_protocol::ProtocolResult<Vec<u8>> {
        let response = match Request::decode(payload) {
            Ok(request) => self.handle(request),
            Err(e) => {
                warn!(error = %e, "undecodable request");
                Response::error(ErrorCode::InvalidRequest, e.to_string())
            }
        };
        response.encode()
    }
}

fn handle_block(store: &BlockStore, request: Request) -> Response {
    match request {
        Request::GetBlock { hash } => match store.get(&hash) {
            Ok(block) => Response::Block { block },
            Err(e) => store_error(e),
        },
        Request::PutBlock { block } => {
            store.put(block);
            Response::PutBlock { success: true }
        }
        Request::HasBlocks { hashes } => Response::HasBlocks {
            hashes: store.has_blocks(&hashes),
        },
        other => wrong_service(other.method()),
    }
}

fn handle_meta(store: &MetaStore, request: Request) -> Response {
    match request {
        Request::GetFileInfoMap => Response::FileInfoMap {
            files: store.file_info_map(),
        },
        Request::UpdateFile { meta } => match store.update_file(meta) {
            Ok(outcome) => Response::update(outcome),
            Err(e) => store_error(e),
        },
        Request::GetBlockStoreAddr => Response::BlockStoreAddr {
            addr: store.block_store_addr().to_string(),
        },
        other => wrong_service(other.method()),
    }
}

fn store_error(err: StoreError) -> Response {
    let code = match err {
        StoreError::BlockNotFound(_) => ErrorCode::NotFound,
        StoreError::InvalidMetadata { .. } => ErrorCode::InvalidRequest,
    };
    Response::error(code, err.to_string())
}

fn wrong_service(method: &str) -> Response {
    Response::error(
        ErrorCode::WrongService,
        format!("{method} is not served by this process"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceRole;
    use surfsync_protocol::{Block, FileMetaData};

    fn handler(role: ServiceRole) -> RequestHandler {
        RequestHandler::new(&ServerConfig::default().with_role(role))
    }

    #[test]
    fn block_round_trip() {
        let handler = handler(ServiceRole::Both);
        let block = Block::new(b"contents".to_vec());

        let resp = handler.handle(Request::PutBlock {
            block: block.clone(),
        });
        assert_eq!(resp, Response::PutBlock { success: true });

        let resp = handler.handle(Request::GetBlock {
            hash: block.hash.clone(),
        });
        assert_eq!(resp, Response::Block { block });
    }

    #[test]
    fn missing_block_is_not_found() {
        let handler = handler(ServiceRole::Block);
        let resp = handler.handle(Request::GetBlock { hash: "x".into() });
        assert!(matches!(
            resp,
            Response::Error {
                code: ErrorCode::NotFound,
                ..
            }
        ));
    }

    #[test]
    fn update_conflict_reports_minus_one() {
        let handler = handler(ServiceRole::Meta);
        let meta = FileMetaData::new("a.txt", 1, vec!["h".into()]);
        handler.handle(Request::UpdateFile { meta: meta.clone() });

        let resp = handler.handle(Request::UpdateFile { meta });
        assert_eq!(
            resp,
            Response::UpdateFile {
                version: -1,
                current_version: 1
            }
        );
    }

    #[test]
    fn role_restricts_services() {
        let meta_only = handler(ServiceRole::Meta);
        let resp = meta_only.handle(Request::HasBlocks { hashes: vec![] });
        assert!(matches!(
            resp,
            Response::Error {
                code: ErrorCode::WrongService,
                ..
            }
        ));
        assert!(meta_only.block_store().is_none());

        let block_only = handler(ServiceRole::Block);
        let resp = block_only.handle(Request::GetFileInfoMap);
        assert!(matches!(
            resp,
            Response::Error {
                code: ErrorCode::WrongService,
                ..
            }
        ));
        assert!(block_only.meta_store().is_none());
    }

    #[test]
    fn advertises_block_store_address() {
        let config = ServerConfig::default()
            .with_role(ServiceRole::Meta)
            .with_block_store_addr("blocks.internal:7000");
        let handler = RequestHandler::new(&config);
        assert_eq!(
            handler.handle(Request::GetBlockStoreAddr),
            Response::BlockStoreAddr {
                addr: "blocks.internal:7000".into()
            }
        );
    }

    #[test]
    fn garbage_frame_yields_invalid_request() {
        let handler = handler(ServiceRole::Both);
        let bytes = handler.handle_frame(&[0xff, 0xff]).unwrap();
        assert!(matches!(
            Response::decode(&bytes).unwrap(),
            Response::Error {
                code: ErrorCode::InvalidRequest,
                ..
            }
        ));
    }
}
