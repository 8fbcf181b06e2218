//! Sync command implementation.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use surfsync_engine::{RemoteStub, SyncConfig, SyncEngine, SyncReport, TcpRpcClient};

/// Runs one sync pass against the server at `server_addr`.
///
/// Fails if any file could not be reconciled, after printing the report.
pub fn run(
    server_addr: &str,
    base_dir: &Path,
    block_size: usize,
    timeout_ms: u64,
) -> Result<(), Box<dyn std::error::Error>> {
    let config = SyncConfig::new(server_addr, base_dir, block_size)
        .with_rpc_timeout(Duration::from_millis(timeout_ms));
    config.validate()?;

    let stub = Arc::new(RemoteStub::new(
        server_addr,
        TcpRpcClient::new(config.rpc_timeout),
    ));
    let engine = SyncEngine::new(config, Arc::clone(&stub), stub);
    let report = engine.sync()?;

    print_report(&report);
    if !report.is_clean() {
        return Err(format!("{} file(s) failed to sync", report.failed.len()).into());
    }
    Ok(())
}

fn print_report(report: &SyncReport) {
    for name in &report.uploaded {
        println!("uploaded    {name}");
    }
    for name in &report.downloaded {
        println!("downloaded  {name}");
    }
    for name in &report.removed {
        println!("removed     {name}");
    }
    for name in &report.conflicts {
        println!("conflict    {name}");
    }
    for (name, reason) in &report.failed {
        println!("failed      {name}: {reason}");
    }
    println!(
        "{} up, {} down, {} removed, {} blocks sent in {:?}",
        report.uploaded.len(),
        report.downloaded.len(),
        report.removed.len(),
        report.blocks_uploaded,
        report.duration
    );
}
