//! Directory scanning and block chunking.

use crate::error::{SyncError, SyncResult};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use surfsync_protocol::{block_hash, Block};
use tracing::{debug, warn};

/// Name of the advisory lock file held during a sync pass.
pub const LOCK_FILE_NAME: &str = ".surfsync.lock";

/// Suffix of partially downloaded files.
pub const PART_SUFFIX: &str = ".surfsync-part";

/// Longest filename, in bytes, the engine will create.
pub const MAX_NAME_LEN: usize = 255;

/// Suffix of the index file while it is being rewritten.
pub const TEMP_SUFFIX: &str = ".tmp";

/// Content fingerprint of every syncable file, keyed by filename.
pub type LocalFiles = BTreeMap<String, Vec<String>>;

/// Result of scanning a base directory.
#[derive(Debug, Default)]
pub struct DirectoryScan {
    /// Files that were fingerprinted.
    pub files: LocalFiles,
    /// Files that exist but could not be read, with the error.
    pub unreadable: Vec<(String, SyncError)>,
}

/// Returns true for names the engine owns and never syncs.
pub fn is_reserved(name: &str, index_file_name: &str) -> bool {
    name == index_file_name
        || name == LOCK_FILE_NAME
        || name.ends_with(PART_SUFFIX)
        || (name.len() == index_file_name.len() + TEMP_SUFFIX.len()
            && name.starts_with(index_file_name)
            && name.ends_with(TEMP_SUFFIX))
}

/// Splits a reader into blocks of `block_size` bytes.
///
/// Every block is full except possibly the last. An empty input yields one
/// empty block, so every file has a non-empty hash list.
pub fn chunk_reader<R: Read>(
    mut reader: R,
    block_size: usize,
    mut on_block: impl FnMut(&[u8]),
) -> io::Result<usize> {
    let mut buf = vec![0u8; block_size];
    let mut count = 0;
    loop {
        let filled = fill(&mut reader, &mut buf)?;
        if filled == 0 && count > 0 {
            break;
        }
        on_block(&buf[..filled]);
        count += 1;
        if filled < block_size {
            break;
        }
    }
    Ok(count)
}

/// Reads until `buf` is full or the reader is exhausted.
fn fill<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Computes the ordered block hash list of a file.
pub fn fingerprint(path: &Path, block_size: usize) -> SyncResult<Vec<String>> {
    let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    let mut hashes = Vec::new();
    chunk_reader(file, block_size, |data| {
        hashes.push(block_hash(data));
    })
    .map_err(|e| SyncError::io(path, e))?;
    Ok(hashes)
}

/// Reads a file as a list of blocks.
pub fn read_blocks(path: &Path, block_size: usize) -> SyncResult<Vec<Block>> {
    let file = File::open(path).map_err(|e| SyncError::io(path, e))?;
    let mut blocks = Vec::new();
    chunk_reader(file, block_size, |data| {
        blocks.push(Block::new(data.to_vec()));
    })
    .map_err(|e| SyncError::io(path, e))?;
    Ok(blocks)
}

/// Fingerprints every syncable file directly inside `dir`.
///
/// Subdirectories, symlinks, reserved names and names that cannot be
/// written to the index are skipped. A file that cannot be read is listed
/// in [`DirectoryScan::unreadable`]; only failing to list `dir` is an error.
pub fn scan_directory(
    dir: &Path,
    block_size: usize,
    index_file_name: &str,
) -> SyncResult<DirectoryScan> {
    let mut scan = DirectoryScan::default();
    let entries = std::fs::read_dir(dir).map_err(|e| SyncError::io(dir, e))?;

    for entry in entries {
        let entry = entry.map_err(|e| SyncError::io(dir, e))?;
        let file_type = entry.file_type().map_err(|e| SyncError::io(entry.path(), e))?;
        if !file_type.is_file() {
            continue;
        }
        let Ok(name) = entry.file_name().into_string() else {
            debug!(path = ?entry.path(), "skipping non-UTF-8 filename");
            continue;
        };
        if is_reserved(&name, index_file_name) {
            continue;
        }
        if name.contains(['\n', '\r']) {
            debug!(name = ?name, "skipping filename with line break");
            continue;
        }
        match fingerprint(&entry.path(), block_size) {
            Ok(hashes) => {
                scan.files.insert(name, hashes);
            }
            Err(e) => {
                warn!(filename = %name, error = %e, "cannot read file");
                scan.unreadable.push((name, e));
            }
        }
    }

    debug!(
        dir = %dir.display(),
        files = scan.files.len(),
        unreadable = scan.unreadable.len(),
        "scanned directory"
    );
    Ok(scan)
}
