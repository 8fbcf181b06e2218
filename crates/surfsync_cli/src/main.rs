//! surfsync CLI
//!
//! Runs the surfsync services and the sync client.
//!
//! # Commands
//!
//! - `serve` - Run the metadata and/or block service
//! - `sync` - Run one sync pass over a directory
//! - `inspect` - Print a directory's index snapshot

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use surfsync_server::ServiceRole;
use tracing_subscriber::EnvFilter;

/// surfsync file synchronization tools.
#[derive(Parser)]
#[command(name = "surfsync")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the metadata and/or block service
    Serve {
        /// Address to listen on
        #[arg(short, long, default_value = "127.0.0.1:8081")]
        addr: SocketAddr,

        /// Services to host (meta, block, both)
        #[arg(short, long, default_value = "both")]
        role: ServiceRole,

        /// Block service address advertised to clients (defaults to --addr)
        #[arg(short, long)]
        block_store_addr: Option<String>,
    },

    /// Run one sync pass over a directory
    Sync {
        /// Metadata service address
        server_addr: String,

        /// Directory to synchronize
        base_dir: PathBuf,

        /// Block size in bytes
        block_size: usize,

        /// Per-RPC deadline in milliseconds
        #[arg(short, long, default_value = "1000")]
        timeout_ms: u64,
    },

    /// Print a directory's index snapshot
    Inspect {
        /// Synchronized directory
        base_dir: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Commands::Serve {
            addr,
            role,
            block_store_addr,
        } => {
            commands::serve::run(addr, role, block_store_addr)?;
        }
        Commands::Sync {
            server_addr,
            base_dir,
            block_size,
            timeout_ms,
        } => {
            commands::sync::run(&server_addr, &base_dir, block_size, timeout_ms)?;
        }
        Commands::Inspect { base_dir, format } => {
            commands::inspect::run(&base_dir, &format)?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sync_positionals() {
        let cli = Cli::try_parse_from(["surfsync", "sync", "localhost:8081", "/tmp/dir", "4096"])
            .unwrap();
        match cli.command {
            Commands::Sync {
                server_addr,
                block_size,
                timeout_ms,
                ..
            } => {
                assert_eq!(server_addr, "localhost:8081");
                assert_eq!(block_size, 4096);
                assert_eq!(timeout_ms, 1000);
            }
            _ => panic!("expected sync"),
        }
    }

    #[test]
    fn parses_serve_role() {
        let cli = Cli::try_parse_from(["surfsync", "-v", "serve", "--role", "block"]).unwrap();
        assert!(cli.verbose);
        assert!(matches!(
            cli.command,
            Commands::Serve {
                role: ServiceRole::Block,
                ..
            }
        ));

        assert!(Cli::try_parse_from(["surfsync", "serve", "--role", "cache"]).is_err());
    }
}
