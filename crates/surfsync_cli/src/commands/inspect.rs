//! Inspect command implementation.

use serde::Serialize;
use std::path::Path;
use surfsync_engine::{load_index, DEFAULT_INDEX_FILE};
use surfsync_protocol::FileMetaData;

/// Index snapshot summary.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Directory path.
    pub base_dir: String,
    /// Number of live files.
    pub file_count: usize,
    /// Number of tombstones.
    pub tombstone_count: usize,
    /// Every index entry, sorted by filename.
    pub files: Vec<FileMetaData>,
}

/// Runs the inspect command.
pub fn run(base_dir: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    if !base_dir.is_dir() {
        return Err(format!("No directory at {:?}", base_dir).into());
    }

    let index = load_index(&base_dir.join(DEFAULT_INDEX_FILE))?;
    let files: Vec<FileMetaData> = index.into_values().collect();
    let tombstone_count = files.iter().filter(|m| m.is_tombstone()).count();
    let result = InspectResult {
        base_dir: base_dir.display().to_string(),
        file_count: files.len() - tombstone_count,
        tombstone_count,
        files,
    };

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&result)?);
        }
        _ => {
            print_text_output(&result);
        }
    }

    Ok(())
}

fn print_text_output(result: &InspectResult) {
    println!("surfsync index: {}", result.base_dir);
    println!(
        "  {} file(s), {} tombstone(s)",
        result.file_count, result.tombstone_count
    );
    println!();
    for meta in &result.files {
        if meta.is_tombstone() {
            println!("  {:<40} v{:<6} deleted", meta.filename, meta.version);
        } else {
            println!(
                "  {:<40} v{:<6} {} block(s)",
                meta.filename,
                meta.version,
                meta.block_hash_list.len()
            );
        }
    }
}
