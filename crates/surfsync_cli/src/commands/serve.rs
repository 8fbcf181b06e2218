//! Serve command implementation.

use std::net::SocketAddr;
use surfsync_server::{ServerConfig, ServiceRole, SurfServer};

/// Runs the server until Ctrl-C.
pub fn run(
    addr: SocketAddr,
    role: ServiceRole,
    block_store_addr: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ServerConfig::new(addr).with_role(role);
    if let Some(block_addr) = block_store_addr {
        config = config.with_block_store_addr(block_addr);
    }

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(SurfServer::new(config).run())?;
    Ok(())
}
