//! Local index snapshot and directory lock.
//!
//! The index records, for every file, the metadata this client last agreed
//! on with the server. It is stored as text in the base directory:
//!
//! ```text
//! <filename>,<version>,<h1> <h2> ... <hn>
//! ```
//!
//! Lines are sorted by filename, so an unchanged snapshot serializes to the
//! same bytes. Filenames may contain commas; the last two fields are split
//! off from the right.

use crate::error::{SyncError, SyncResult};
use crate::scan::{LOCK_FILE_NAME, TEMP_SUFFIX};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use surfsync_protocol::{FileInfoMap, FileMetaData};
use tracing::debug;

/// Parses an index snapshot.
pub fn parse_index(text: &str) -> SyncResult<FileInfoMap> {
    let mut files = FileInfoMap::new();
    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let corrupt = |message: &str| SyncError::CorruptIndex {
            line: line_no,
            message: message.to_string(),
        };

        let mut fields = line.rsplitn(3, ',');
        let hashes = fields.next().ok_or_else(|| corrupt("missing hash list"))?;
        let version = fields.next().ok_or_else(|| corrupt("missing version"))?;
        let filename = fields.next().ok_or_else(|| corrupt("missing filename"))?;

        if filename.is_empty() {
            return Err(corrupt("empty filename"));
        }
        let version: u64 = version
            .parse()
            .map_err(|_| corrupt(&format!("bad version {version:?}")))?;
        let block_hash_list: Vec<String> = hashes.split_whitespace().map(str::to_string).collect();
        if block_hash_list.is_empty() {
            return Err(corrupt("empty hash list"));
        }
        if files.contains_key(filename) {
            return Err(corrupt(&format!("duplicate entry for {filename}")));
        }

        files.insert(
            filename.to_string(),
            FileMetaData::new(filename, version, block_hash_list),
        );
    }
    Ok(files)
}

/// Serializes an index snapshot.
pub fn render_index(files: &FileInfoMap) -> String {
    let mut out = String::new();
    for meta in files.values() {
        out.push_str(&meta.filename);
        out.push(',');
        out.push_str(&meta.version.to_string());
        out.push(',');
        out.push_str(&meta.block_hash_list.join(" "));
        out.push('\n');
    }
    out
}

/// Loads the index at `path`. A missing file is an empty snapshot.
pub fn load_index(path: &Path) -> SyncResult<FileInfoMap> {
    match fs::read_to_string(path) {
        Ok(text) => parse_index(&text),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no index, starting empty");
            Ok(FileInfoMap::new())
        }
        Err(e) => Err(SyncError::io(path, e)),
    }
}

/// Writes the index at `path` atomically.
///
/// The snapshot goes to a temporary sibling first, which is synced and
/// renamed over the target; the directory is then synced so the rename
/// survives a crash.
pub fn save_index(path: &Path, files: &FileInfoMap) -> SyncResult<()> {
    let mut temp = path.as_os_str().to_os_string();
    temp.push(TEMP_SUFFIX);
    let temp = PathBuf::from(temp);

    {
        let mut file = File::create(&temp).map_err(|e| SyncError::io(&temp, e))?;
        file.write_all(render_index(files).as_bytes())
            .and_then(|_| file.sync_all())
            .map_err(|e| SyncError::io(&temp, e))?;
    }

    fs::rename(&temp, path).map_err(|e| SyncError::io(path, e))?;

    if let Some(parent) = path.parent() {
        sync_directory(parent)?;
    }
    debug!(path = %path.display(), entries = files.len(), "saved index");
    Ok(())
}

/// Fsyncs a directory so renames inside it are durable.
#[cfg(unix)]
pub(crate) fn sync_directory(dir: &Path) -> SyncResult<()> {
    let handle = File::open(dir).map_err(|e| SyncError::io(dir, e))?;
    handle.sync_all().map_err(|e| SyncError::io(dir, e))
}

/// Directory fsync is not available on this platform.
#[cfg(not(unix))]
pub(crate) fn sync_directory(_dir: &Path) -> SyncResult<()> {
    Ok(())
}

/// Exclusive advisory lock on a base directory.
///
/// Held for the duration of a sync pass; released on drop.
#[derive(Debug)]
pub struct DirLock {
    path: PathBuf,
    _file: File,
}

impl DirLock {
    /// Acquires the lock without blocking.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::DirectoryLocked`] if another pass holds it.
    pub fn acquire(dir: &Path) -> SyncResult<Self> {
        let path = dir.join(LOCK_FILE_NAME);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| SyncError::io(&path, e))?;

        if file.try_lock_exclusive().is_err() {
            return Err(SyncError::DirectoryLocked(dir.to_path_buf()));
        }
        Ok(Self { path, _file: file })
    }

    /// Returns the path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FileInfoMap {
        let mut files = FileInfoMap::new();
        for meta in [
            FileMetaData::new("b.txt", 2, vec!["h1".into(), "h2".into()]),
            FileMetaData::new("a, with commas.txt", 1, vec!["h3".into()]),
            FileMetaData::tombstone("gone.txt", 4),
        ] {
            files.insert(meta.filename.clone(), meta);
        }
        files
    }

    #[test]
    fn render_is_sorted() {
        let text = render_index(&sample());
        assert_eq!(
            text,
            "a, with commas.txt,1,h3\nb.txt,2,h1 h2\ngone.txt,4,0\n"
        );
    }

    #[test]
    fn parse_inverts_render() {
        let files = sample();
        assert_eq!(parse_index(&render_index(&files)).unwrap(), files);
    }

    #[test]
    fn blank_lines_are_ignored() {
        let files = parse_index("\na.txt,1,h\n\n").unwrap();
        assert_eq!(files.len(), 1);
    }

    #[test]
    fn malformed_lines_report_position() {
        let err = parse_index("a.txt,1,h\nb.txt,x,h\n").unwrap_err();
        assert!(matches!(err, SyncError::CorruptIndex { line: 2, .. }));

        let err = parse_index("justaname\n").unwrap_err();
        assert!(matches!(err, SyncError::CorruptIndex { line: 1, .. }));

        let err = parse_index("a.txt,1,\n").unwrap_err();
        assert!(matches!(err, SyncError::CorruptIndex { line: 1, .. }));

        let err = parse_index("a.txt,1,h\na.txt,2,h\n").unwrap_err();
        assert!(matches!(err, SyncError::CorruptIndex { line: 2, .. }));
    }

    #[test]
    fn missing_index_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let files = load_index(&dir.path().join("index.txt")).unwrap();
        assert!(files.is_empty());
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("index.txt");
        save_index(&path, &sample()).unwrap();

        assert_eq!(load_index(&path).unwrap(), sample());
        assert!(!dir.path().join("index.txt.tmp").exists());
    }

    #[test]
    fn lock_is_exclusive() {
        let dir = tempfile::tempdir().unwrap();
        let first = DirLock::acquire(dir.path()).unwrap();
        assert!(matches!(
            DirLock::acquire(dir.path()),
            Err(SyncError::DirectoryLocked(_))
        ));
        drop(first);
        assert!(DirLock::acquire(dir.path()).is_ok());
    }
}
