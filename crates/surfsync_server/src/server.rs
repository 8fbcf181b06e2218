//! Async TCP listener.

use crate::config::ServerConfig;
use crate::error::ServerResult;
use crate::handler::RequestHandler;
use std::future::Future;
use std::io::ErrorKind;
use std::sync::Arc;
use surfsync_protocol::ProtocolError;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

/// A surfsync server process.
///
/// Owns the stores for its role and serves them over TCP until shut down.
pub struct SurfServer {
    config: ServerConfig,
    handler: Arc<RequestHandler>,
}

impl SurfServer {
    /// Creates a server with fresh stores.
    pub fn new(config: ServerConfig) -> Self {
        let handler = Arc::new(RequestHandler::new(&config));
        Self { config, handler }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the request handler.
    pub fn handler(&self) -> Arc<RequestHandler> {
        Arc::clone(&self.handler)
    }

    /// Binds the configured address and serves until Ctrl-C.
    pub async fn run(self) -> ServerResult<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        info!(
            addr = %listener.local_addr()?,
            role = %self.config.role,
            "surfsync server listening"
        );
        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
        };
        serve(listener, self.handler, self.config.max_frame_size, shutdown).await
    }
}

/// Accepts connections on `listener` until `shutdown` resolves.
///
/// Each connection is served on its own task, one response per request frame.
pub async fn serve<F>(
    listener: TcpListener,
    handler: Arc<RequestHandler>,
    max_frame_size: usize,
    shutdown: F,
) -> ServerResult<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            _ = &mut shutdown => return Ok(()),
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "accept failed");
                        continue;
                    }
                };
                let handler = Arc::clone(&handler);
                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, handler, max_frame_size).await {
                        debug!(%peer, error = %e, "connection closed with error");
                    }
                });
            }
        }
    }
}

async fn handle_connection(
    mut stream: TcpStream,
    handler: Arc<RequestHandler>,
    max_frame_size: usize,
) -> ServerResult<()> {
    loop {
        let len = match stream.read_u32().await {
            Ok(len) => len as usize,
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        if len > max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: len,
                limit: max_frame_size,
            }
            .into());
        }

        let mut payload = vec![0u8; len];
        stream.read_exact(&mut payload).await?;

        let response = handler.handle_frame(&payload)?;
        let response_len = u32::try_from(response.len()).map_err(|_| {
            ProtocolError::FrameTooLarge {
                size: response.len(),
                limit: u32::MAX as usize,
            }
        })?;
        stream.write_u32(response_len).await?;
        stream.write_all(&response).await?;
        stream.flush().await?;
    }
}
