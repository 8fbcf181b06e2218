//! Wire-level tests against a listening server.

use std::sync::Arc;
use surfsync_protocol::{Block, FileMetaData, Request, Response};
use surfsync_server::{serve, RequestHandler, ServerConfig, ServiceRole};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;

async fn call(stream: &mut TcpStream, request: &Request) -> Response {
    let payload = request.encode().unwrap();
    stream.write_u32(payload.len() as u32).await.unwrap();
    stream.write_all(&payload).await.unwrap();

    let len = stream.read_u32().await.unwrap() as usize;
    let mut buf = vec![0u8; len];
    stream.read_exact(&mut buf).await.unwrap();
    Response::decode(&buf).unwrap()
}

async fn start(role: ServiceRole) -> (std::net::SocketAddr, oneshot::Sender<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig::new(addr).with_role(role);
    let handler = Arc::new(RequestHandler::new(&config));
    let (tx, rx) = oneshot::channel();
    tokio::spawn(serve(listener, handler, config.max_frame_size, async {
        let _ = rx.await;
    }));
    (addr, tx)
}

#[tokio::test]
async fn several_requests_on_one_connection() {
    let (addr, _shutdown) = start(ServiceRole::Both).await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let block = Block::new(bytes::Bytes::from_static(b"over the wire"));
    let resp = call(
        &mut stream,
        &Request::PutBlock {
            block: block.clone(),
        },
    )
    .await;
    assert_eq!(resp, Response::PutBlock { success: true });

    let resp = call(
        &mut stream,
        &Request::HasBlocks {
            hashes: vec![block.hash.clone(), "missing".into()],
        },
    )
    .await;
    assert_eq!(
        resp,
        Response::HasBlocks {
            hashes: vec![block.hash.clone()]
        }
    );

    let meta = FileMetaData::new("a.txt", 1, vec![block.hash.clone()]);
    let resp = call(&mut stream, &Request::UpdateFile { meta }).await;
    assert_eq!(
        resp,
        Response::UpdateFile {
            version: 1,
            current_version: 1
        }
    );

    match call(&mut stream, &Request::GetFileInfoMap).await {
        Response::FileInfoMap { files } => {
            assert_eq!(files.len(), 1);
            assert_eq!(files["a.txt"].version, 1);
        }
        other => panic!("unexpected response: {other:?}"),
    }

    let resp = call(&mut stream, &Request::GetBlockStoreAddr).await;
    assert_eq!(
        resp,
        Response::BlockStoreAddr {
            addr: addr.to_string()
        }
    );
}

#[tokio::test]
async fn oversized_frame_drops_connection() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let config = ServerConfig::new(addr).with_max_frame_size(16);
    let handler = Arc::new(RequestHandler::new(&config));
    tokio::spawn(serve(listener, handler, 16, std::future::pending()));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_u32(1024).await.unwrap();
    stream.write_all(&[0u8; 64]).await.unwrap();

    let mut buf = [0u8; 4];
    let read = stream.read(&mut buf).await.unwrap_or(0);
    assert_eq!(read, 0);
}
