//! Configuration for the sync engine.

use crate::error::{SyncError, SyncResult};
use std::path::PathBuf;
use std::time::Duration;

/// Default name of the index snapshot file inside the base directory.
pub const DEFAULT_INDEX_FILE: &str = "index.txt";

/// Default deadline for a single RPC.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a sync client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Address of the metadata service.
    pub server_addr: String,
    /// Directory being synchronized.
    pub base_dir: PathBuf,
    /// Bytes per block.
    pub block_size: usize,
    /// Deadline applied to each RPC.
    pub rpc_timeout: Duration,
    /// Name of the index snapshot file inside `base_dir`.
    pub index_file_name: String,
}

impl SyncConfig {
    /// Creates a new sync configuration.
    pub fn new(server_addr: impl Into<String>, base_dir: impl Into<PathBuf>, block_size: usize) -> Self {
        Self {
            server_addr: server_addr.into(),
            base_dir: base_dir.into(),
            block_size,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
            index_file_name: DEFAULT_INDEX_FILE.to_string(),
        }
    }

    /// Sets the RPC deadline.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    /// Sets the index snapshot file name.
    pub fn with_index_file_name(mut self, name: impl Into<String>) -> Self {
        self.index_file_name = name.into();
        self
    }

    /// Returns the full path of the index snapshot.
    pub fn index_path(&self) -> PathBuf {
        self.base_dir.join(&self.index_file_name)
    }

    /// Checks the configuration for values the engine cannot work with.
    pub fn validate(&self) -> SyncResult<()> {
        if self.block_size == 0 {
            return Err(SyncError::InvalidConfig("block size must be positive".into()));
        }
        if self.server_addr.trim().is_empty() {
            return Err(SyncError::InvalidConfig("server address is empty".into()));
        }
        if self.rpc_timeout.is_zero() {
            return Err(SyncError::InvalidConfig("rpc timeout must be positive".into()));
        }
        if self.index_file_name.is_empty()
            || self.index_file_name.contains(['/', '\\'])
        {
            return Err(SyncError::InvalidConfig(format!(
                "invalid index file name: {:?}",
                self.index_file_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("127.0.0.1:8081", "/tmp/base", 4096)
            .with_rpc_timeout(Duration::from_millis(250))
            .with_index_file_name("state.txt");

        assert_eq!(config.server_addr, "127.0.0.1:8081");
        assert_eq!(config.block_size, 4096);
        assert_eq!(config.rpc_timeout, Duration::from_millis(250));
        assert_eq!(config.index_path(), PathBuf::from("/tmp/base/state.txt"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults() {
        let config = SyncConfig::new("addr", "dir", 1);
        assert_eq!(config.rpc_timeout, Duration::from_secs(1));
        assert_eq!(config.index_file_name, "index.txt");
    }

    #[test]
    fn invalid_configs() {
        assert!(SyncConfig::new("addr", "dir", 0).validate().is_err());
        assert!(SyncConfig::new("  ", "dir", 16).validate().is_err());
        assert!(SyncConfig::new("addr", "dir", 16)
            .with_rpc_timeout(Duration::ZERO)
            .validate()
            .is_err());
        assert!(SyncConfig::new("addr", "dir", 16)
            .with_index_file_name("sub/index.txt")
            .validate()
            .is_err());
    }
}
