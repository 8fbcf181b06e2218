//! Server configuration.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;
use surfsync_protocol::DEFAULT_MAX_FRAME_SIZE;

/// Which services a server process hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceRole {
    /// Metadata service only.
    Meta,
    /// Block service only.
    Block,
    /// Both services in one process.
    Both,
}

impl ServiceRole {
    /// Returns true if the metadata service is hosted.
    pub fn hosts_meta(&self) -> bool {
        matches!(self, ServiceRole::Meta | ServiceRole::Both)
    }

    /// Returns true if the block service is hosted.
    pub fn hosts_block(&self) -> bool {
        matches!(self, ServiceRole::Block | ServiceRole::Both)
    }
}

impl FromStr for ServiceRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "meta" => Ok(ServiceRole::Meta),
            "block" => Ok(ServiceRole::Block),
            "both" => Ok(ServiceRole::Both),
            other => Err(format!("unknown service role: {other}")),
        }
    }
}

impl fmt::Display for ServiceRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServiceRole::Meta => "meta",
            ServiceRole::Block => "block",
            ServiceRole::Both => "both",
        };
        f.write_str(name)
    }
}

/// Configuration for a server process.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to.
    pub bind_addr: SocketAddr,
    /// Services hosted by this process.
    pub role: ServiceRole,
    /// Address clients should use for the block service.
    pub block_store_addr: Option<String>,
    /// Maximum accepted request frame size.
    pub max_frame_size: usize,
}

impl ServerConfig {
    /// Creates a configuration hosting both services.
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            role: ServiceRole::Both,
            block_store_addr: None,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Sets the hosted services.
    pub fn with_role(mut self, role: ServiceRole) -> Self {
        self.role = role;
        self
    }

    /// Sets the block service address advertised to clients.
    pub fn with_block_store_addr(mut self, addr: impl Into<String>) -> Self {
        self.block_store_addr = Some(addr.into());
        self
    }

    /// Sets the maximum frame size.
    pub fn with_max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Returns the block service address advertised to clients.
    ///
    /// Defaults to the bind address.
    pub fn advertised_block_store_addr(&self) -> String {
        self.block_store_addr
            .clone()
            .unwrap_or_else(|| self.bind_addr.to_string())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 8081)))
    }
}
