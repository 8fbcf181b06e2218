//! Sync engine state machine.
//!
//! A pass runs to completion in the calling thread:
//!
//! 1. scan the base directory and diff it against the index snapshot,
//! 2. fetch the server's file map once,
//! 3. reconcile every file (push, pull or keep),
//! 4. persist the reconciled snapshot.
//!
//! Per-file failures are recorded in the [`SyncReport`] and leave that
//! file's previous index entry in place, so the next pass retries it.

use crate::client::{BlockStoreClient, MetaStoreClient};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::index::{load_index, save_index, DirLock};
use crate::scan::{
    is_reserved, read_blocks, scan_directory, LocalFiles, MAX_NAME_LEN, PART_SUFFIX,
};
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use surfsync_protocol::{block_hash, FileInfoMap, FileMetaData, UpdateOutcome};
use tracing::{debug, info, warn};

/// The current state of the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    /// No pass has run yet.
    Idle,
    /// Scanning the base directory.
    Scanning,
    /// Pushing and pulling files.
    Reconciling,
    /// Writing the index snapshot.
    Committing,
    /// The last pass completed.
    Synced,
    /// The last pass failed.
    Error,
}

impl SyncState {
    /// Returns true while a pass is running.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            SyncState::Scanning | SyncState::Reconciling | SyncState::Committing
        )
    }

    /// Returns true if a new pass can start.
    pub fn can_start_sync(&self) -> bool {
        !self.is_active()
    }
}

/// Cumulative statistics across passes.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Passes that reached the commit step.
    pub passes_completed: u64,
    /// Files pushed to the server.
    pub files_uploaded: u64,
    /// Files pulled from the server, deletions included.
    pub files_downloaded: u64,
    /// Uploads rejected with a version conflict.
    pub conflicts: u64,
    /// Time the last pass completed.
    pub last_sync_time: Option<Instant>,
    /// Error of the last failed pass.
    pub last_error: Option<String>,
}

/// Outcome of a single pass.
#[derive(Debug, Clone, Default)]
pub struct SyncReport {
    /// Files whose local version was accepted by the server.
    pub uploaded: Vec<String>,
    /// Files written from server content.
    pub downloaded: Vec<String>,
    /// Files deleted locally because the server holds a tombstone.
    pub removed: Vec<String>,
    /// Files whose upload lost a version race and were pulled instead.
    pub conflicts: Vec<String>,
    /// Files that could not be reconciled, with the reason.
    pub failed: Vec<(String, String)>,
    /// Blocks sent to the block service.
    pub blocks_uploaded: u64,
    /// Wall time of the pass.
    pub duration: Duration,
}

impl SyncReport {
    /// Returns true if every file was reconciled.
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }

    /// Returns true if the pass moved no files in either direction.
    pub fn is_noop(&self) -> bool {
        self.uploaded.is_empty()
            && self.downloaded.is_empty()
            && self.removed.is_empty()
            && self.conflicts.is_empty()
            && self.failed.is_empty()
    }
}

/// How a file differs from the index snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Change {
    Unchanged,
    New,
    Modified,
    Deleted,
}

/// A file's local state after diffing against the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct LocalEntry {
    pub(crate) meta: FileMetaData,
    pub(crate) change: Change,
}

/// Classifies every file known locally or in the snapshot.
pub(crate) fn diff_local(snapshot: &FileInfoMap, local: &LocalFiles) -> BTreeMap<String, LocalEntry> {
    let mut entries = BTreeMap::new();

    for (name, hashes) in local {
        let entry = match snapshot.get(name) {
            None => LocalEntry {
                meta: FileMetaData::new(name.as_str(), 1, hashes.clone()),
                change: Change::New,
            },
            // A file recreated after deletion continues from the tombstone's version.
            Some(prev) if prev.is_tombstone() || prev.block_hash_list != *hashes => LocalEntry {
                meta: FileMetaData::new(name.as_str(), prev.version, hashes.clone()),
                change: Change::Modified,
            },
            Some(prev) => LocalEntry {
                meta: prev.clone(),
                change: Change::Unchanged,
            },
        };
        entries.insert(name.clone(), entry);
    }

    for (name, prev) in snapshot {
        if local.contains_key(name) {
            continue;
        }
        let entry = if prev.is_tombstone() {
            LocalEntry {
                meta: prev.clone(),
                change: Change::Unchanged,
            }
        } else {
            LocalEntry {
                meta: FileMetaData::tombstone(name.as_str(), prev.version + 1),
                change: Change::Deleted,
            }
        };
        entries.insert(name.clone(), entry);
    }

    entries
}

/// The client-side sync engine.
///
/// Generic over the metadata and block service clients so the same engine
/// drives a remote deployment or an in-process one.
pub struct SyncEngine<M: MetaStoreClient, B: BlockStoreClient> {
    config: SyncConfig,
    meta: Arc<M>,
    blocks: Arc<B>,
    state: RwLock<SyncState>,
    stats: RwLock<SyncStats>,
}

impl<M: MetaStoreClient, B: BlockStoreClient> SyncEngine<M, B> {
    /// Creates a new sync engine.
    pub fn new(config: SyncConfig, meta: Arc<M>, blocks: Arc<B>) -> Self {
        Self {
            config,
            meta,
            blocks,
            state: RwLock::new(SyncState::Idle),
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current state.
    pub fn state(&self) -> SyncState {
        *self.state.read()
    }

    /// Gets the cumulative stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    fn set_state(&self, state: SyncState) {
        *self.state.write() = state;
    }

    /// Claims the engine for a pass.
    fn begin(&self) -> SyncResult<()> {
        let mut state = self.state.write();
        if !state.can_start_sync() {
            return Err(SyncError::InvalidStateTransition {
                from: format!("{:?}", *state),
                to: format!("{:?}", SyncState::Scanning),
            });
        }
        *state = SyncState::Scanning;
        Ok(())
    }

    /// Runs one full sync pass.
    ///
    /// # Errors
    ///
    /// Fails the whole pass if the directory cannot be locked or scanned,
    /// the server map cannot be fetched, or the index cannot be written.
    /// Failures confined to one file are reported in
    /// [`SyncReport::failed`] instead.
    pub fn sync(&self) -> SyncResult<SyncReport> {
        let start = Instant::now();
        self.begin()?;

        match self.run_pass() {
            Ok(mut report) => {
                report.duration = start.elapsed();
                self.set_state(SyncState::Synced);

                let mut stats = self.stats.write();
                stats.passes_completed += 1;
                stats.files_uploaded += report.uploaded.len() as u64;
                stats.files_downloaded += (report.downloaded.len() + report.removed.len()) as u64;
                stats.conflicts += report.conflicts.len() as u64;
                stats.last_sync_time = Some(Instant::now());
                stats.last_error = report.failed.first().map(|(name, e)| format!("{name}: {e}"));

                info!(
                    uploaded = report.uploaded.len(),
                    downloaded = report.downloaded.len(),
                    removed = report.removed.len(),
                    conflicts = report.conflicts.len(),
                    failed = report.failed.len(),
                    elapsed_ms = report.duration.as_millis() as u64,
                    "sync pass complete"
                );
                Ok(report)
            }
            Err(e) => {
                warn!(error = %e, "sync pass failed");
                self.set_state(SyncState::Error);
                self.stats.write().last_error = Some(e.to_string());
                Err(e)
            }
        }
    }

    fn run_pass(&self) -> SyncResult<SyncReport> {
        self.config.validate()?;
        let base_dir = &self.config.base_dir;
        if !base_dir.is_dir() {
            return Err(SyncError::InvalidConfig(format!(
                "base directory does not exist: {}",
                base_dir.display()
            )));
        }

        let _lock = DirLock::acquire(base_dir)?;
        let index_path = self.config.index_path();
        let snapshot = load_index(&index_path)?;
        let scan = scan_directory(
            base_dir,
            self.config.block_size,
            &self.config.index_file_name,
        )?;

        // Unreadable files keep their snapshot entry and sit this pass out.
        let unreadable: BTreeSet<String> =
            scan.unreadable.iter().map(|(name, _)| name.clone()).collect();
        let mut baseline = snapshot.clone();
        baseline.retain(|name, _| !unreadable.contains(name));
        let entries = diff_local(&baseline, &scan.files);

        self.set_state(SyncState::Reconciling);
        let remote = self.meta.get_file_info_map()?;

        let mut pass = Pass {
            config: &self.config,
            meta: self.meta.as_ref(),
            blocks: self.blocks.as_ref(),
            block_store_addr: None,
            index: FileInfoMap::new(),
            report: SyncReport::default(),
        };

        for (name, err) in scan.unreadable {
            let previous = snapshot.get(&name);
            pass.fail(&name, err, previous);
        }
        for (name, entry) in &entries {
            pass.reconcile(entry, remote.get(name), snapshot.get(name));
        }
        for (name, server) in &remote {
            if !entries.contains_key(name) && !unreadable.contains(name) {
                pass.pull_new(server);
            }
        }

        self.set_state(SyncState::Committing);
        let Pass { index, report, .. } = pass;
        if index != snapshot || !index_path.exists() {
            save_index(&index_path, &index)?;
        }
        Ok(report)
    }
}

/// Working state of one pass.
struct Pass<'a, M: MetaStoreClient, B: BlockStoreClient> {
    config: &'a SyncConfig,
    meta: &'a M,
    blocks: &'a B,
    /// Fetched on first block operation.
    block_store_addr: Option<String>,
    /// Snapshot being built for the commit step.
    index: FileInfoMap,
    report: SyncReport,
}

impl<M: MetaStoreClient, B: BlockStoreClient> Pass<'_, M, B> {
    fn reconcile(
        &mut self,
        local: &LocalEntry,
        server: Option<&FileMetaData>,
        previous: Option<&FileMetaData>,
    ) {
        let name = &local.meta.filename;
        let Some(server) = server else {
            debug!(filename = %name, "not on server, pushing");
            self.push(local.meta.clone(), previous);
            return;
        };

        let changed = local.change != Change::Unchanged;
        if local.meta.same_content(server) && (changed || local.meta.version <= server.version) {
            debug!(filename = %name, version = server.version, "content matches server");
            self.index.insert(name.clone(), server.clone());
            return;
        }

        match local.meta.version.cmp(&server.version) {
            Ordering::Equal if !changed => {
                self.index.insert(name.clone(), local.meta.clone());
            }
            Ordering::Equal => {
                debug!(filename = %name, change = ?local.change, "local change, pushing");
                self.push(local.meta.with_version(server.version + 1), previous);
            }
            Ordering::Greater => {
                debug!(filename = %name, local = local.meta.version, server = server.version, "ahead of server, pushing");
                self.push(local.meta.clone(), previous);
            }
            Ordering::Less => {
                if changed {
                    info!(filename = %name, server = server.version, "server is ahead, discarding local change");
                }
                self.pull(server, previous);
            }
        }
    }

    fn pull_new(&mut self, server: &FileMetaData) {
        if server.is_tombstone() {
            self.index.insert(server.filename.clone(), server.clone());
            return;
        }
        self.pull(server, None);
    }

    fn push(&mut self, meta: FileMetaData, previous: Option<&FileMetaData>) {
        let name = meta.filename.clone();
        match self.upload(&meta) {
            Ok(UpdateOutcome::Accepted(version)) => {
                info!(filename = %name, version, tombstone = meta.is_tombstone(), "uploaded");
                self.index.insert(name.clone(), meta.with_version(version));
                self.report.uploaded.push(name);
            }
            Ok(UpdateOutcome::Conflict { current_version }) => {
                info!(filename = %name, attempted = meta.version, current_version, "version conflict, pulling");
                self.report.conflicts.push(name.clone());
                match self.meta.get_file_info_map() {
                    Ok(files) => match files.get(&name) {
                        Some(server) => self.pull(server, previous),
                        None => self.fail(
                            &name,
                            SyncError::Protocol("conflicting file missing from server map".into()),
                            previous,
                        ),
                    },
                    Err(e) => self.fail(&name, e, previous),
                }
            }
            Err(e) => self.fail(&name, e, previous),
        }
    }

    fn pull(&mut self, server: &FileMetaData, previous: Option<&FileMetaData>) {
        let name = server.filename.clone();
        match self.download(server) {
            Ok(()) => {
                info!(filename = %name, version = server.version, tombstone = server.is_tombstone(), "downloaded");
                self.index.insert(name.clone(), server.clone());
                if server.is_tombstone() {
                    self.report.removed.push(name);
                } else {
                    self.report.downloaded.push(name);
                }
            }
            Err(e) => self.fail(&name, e, previous),
        }
    }

    fn fail(&mut self, name: &str, err: SyncError, previous: Option<&FileMetaData>) {
        warn!(filename = %name, error = %err, "could not reconcile file");
        if let Some(prev) = previous {
            self.index.insert(name.to_string(), prev.clone());
        }
        self.report.failed.push((name.to_string(), err.to_string()));
    }

    fn block_store_addr(&mut self) -> SyncResult<String> {
        if let Some(addr) = &self.block_store_addr {
            return Ok(addr.clone());
        }
        let addr = self.meta.get_block_store_addr()?;
        debug!(addr = %addr, "resolved block store");
        self.block_store_addr = Some(addr.clone());
        Ok(addr)
    }

    fn local_path(&self, name: &str) -> SyncResult<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\', '\0', '\n', '\r'])
            || is_reserved(name, &self.config.index_file_name)
        {
            return Err(SyncError::Protocol(format!("unusable filename {name:?}")));
        }
        Ok(self.config.base_dir.join(name))
    }

    /// Sends missing blocks, then the metadata.
    fn upload(&mut self, meta: &FileMetaData) -> SyncResult<UpdateOutcome> {
        if !meta.is_tombstone() {
            let path = self.local_path(&meta.filename)?;
            let blocks = read_blocks(&path, self.config.block_size)?;
            if blocks.len() != meta.block_hash_list.len()
                || blocks
                    .iter()
                    .zip(&meta.block_hash_list)
                    .any(|(block, hash)| block.hash != *hash)
            {
                return Err(SyncError::FileChanged {
                    filename: meta.filename.clone(),
                });
            }

            let addr = self.block_store_addr()?;
            let mut seen = HashSet::new();
            let unique: Vec<String> = meta
                .block_hash_list
                .iter()
                .filter(|hash| seen.insert(hash.as_str()))
                .cloned()
                .collect();
            let present: HashSet<String> =
                self.blocks.has_blocks(&addr, &unique)?.into_iter().collect();

            let mut sent = HashSet::new();
            for block in &blocks {
                if present.contains(&block.hash) || !sent.insert(block.hash.as_str()) {
                    continue;
                }
                if !self.blocks.put_block(&addr, block)? {
                    return Err(SyncError::Server(format!(
                        "block store rejected block {}",
                        block.hash
                    )));
                }
                self.report.blocks_uploaded += 1;
            }
        }
        self.meta.update_file(meta)
    }

    /// Makes the local file match `meta`.
    fn download(&mut self, meta: &FileMetaData) -> SyncResult<()> {
        let path = self.local_path(&meta.filename)?;
        if meta.is_tombstone() {
            return match fs::remove_file(&path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(SyncError::io(&path, e)),
            };
        }

        let part_name = format!("{}{PART_SUFFIX}", meta.filename);
        if part_name.len() > MAX_NAME_LEN {
            return Err(SyncError::Protocol(format!(
                "unusable filename {:?}: too long to download",
                meta.filename
            )));
        }
        let part = self.config.base_dir.join(part_name);
        let addr = self.block_store_addr()?;
        if let Err(e) = self.write_part(&addr, meta, &part) {
            let _ = fs::remove_file(&part);
            return Err(e);
        }
        fs::rename(&part, &path).map_err(|e| {
            let _ = fs::remove_file(&part);
            SyncError::io(&path, e)
        })
    }

    fn write_part(&self, addr: &str, meta: &FileMetaData, part: &Path) -> SyncResult<()> {
        let mut file = File::create(part).map_err(|e| SyncError::io(part, e))?;
        for hash in &meta.block_hash_list {
            let block = self.blocks.get_block(addr, hash)?;
            let actual = block_hash(&block.data);
            if actual != *hash {
                return Err(SyncError::BlockMismatch {
                    expected: hash.clone(),
                    actual,
                });
            }
            file.write_all(&block.data)
                .map_err(|e| SyncError::io(part, e))?;
        }
        file.sync_all().map_err(|e| SyncError::io(part, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::InProcessRemote;

    fn files(entries: &[(&str, &[&str])]) -> LocalFiles {
        entries
            .iter()
            .map(|(name, hashes)| {
                (
                    name.to_string(),
                    hashes.iter().map(|h| h.to_string()).collect(),
                )
            })
            .collect()
    }

    fn snapshot(entries: &[FileMetaData]) -> FileInfoMap {
        entries
            .iter()
            .map(|m| (m.filename.clone(), m.clone()))
            .collect()
    }

    fn engine(dir: &Path, remote: &InProcessRemote) -> SyncEngine<InProcessRemote, InProcessRemote> {
        let remote = Arc::new(remote.clone());
        SyncEngine::new(SyncConfig::new("in-process", dir, 4), remote.clone(), remote)
    }

    #[test]
    fn diff_classifies_files() {
        let snap = snapshot(&[
            FileMetaData::new("same", 2, vec!["a".into()]),
            FileMetaData::new("edited", 3, vec!["b".into()]),
            FileMetaData::new("deleted", 4, vec!["c".into()]),
            FileMetaData::tombstone("still-gone", 5),
            FileMetaData::tombstone("revived", 6),
        ]);
        let local = files(&[
            ("same", &["a"]),
            ("edited", &["b", "b2"]),
            ("revived", &["d"]),
            ("fresh", &["e"]),
        ]);

        let diff = diff_local(&snap, &local);
        assert_eq!(diff["same"].change, Change::Unchanged);
        assert_eq!(diff["edited"].change, Change::Modified);
        assert_eq!(diff["edited"].meta.version, 3);
        assert_eq!(diff["deleted"].change, Change::Deleted);
        assert_eq!(diff["deleted"].meta, FileMetaData::tombstone("deleted", 5));
        assert_eq!(diff["still-gone"].change, Change::Unchanged);
        assert_eq!(diff["still-gone"].meta.version, 5);
        assert_eq!(diff["revived"].change, Change::Modified);
        assert_eq!(diff["revived"].meta.version, 6);
        assert_eq!(diff["fresh"].change, Change::New);
        assert_eq!(diff["fresh"].meta.version, 1);
    }

    #[test]
    fn state_after_passes() {
        let dir = tempfile::tempdir().unwrap();
        let remote = InProcessRemote::new();
        let engine = engine(dir.path(), &remote);
        assert_eq!(engine.state(), SyncState::Idle);

        engine.sync().unwrap();
        assert_eq!(engine.state(), SyncState::Synced);
        assert_eq!(engine.stats().passes_completed, 1);

        let missing = SyncEngine::new(
            SyncConfig::new("in-process", dir.path().join("missing"), 4),
            Arc::new(remote.clone()),
            Arc::new(remote),
        );
        assert!(matches!(missing.sync(), Err(SyncError::InvalidConfig(_))));
        assert_eq!(missing.state(), SyncState::Error);
        assert!(missing.stats().last_error.is_some());
        // An errored engine can run again.
        assert!(missing.state().can_start_sync());
    }

    #[test]
    fn push_then_converge() {
        let dir = tempfile::tempdir().unwrap();
        let remote = InProcessRemote::new();
        let engine = engine(dir.path(), &remote);
        fs::write(dir.path().join("a.txt"), b"hello world").unwrap();

        let report = engine.sync().unwrap();
        assert_eq!(report.uploaded, vec!["a.txt".to_string()]);
        assert_eq!(report.blocks_uploaded, 3);
        assert_eq!(remote.meta_store().get("a.txt").unwrap().version, 1);

        remote.reset_counters();
        let report = engine.sync().unwrap();
        assert!(report.is_noop());
        assert_eq!(remote.counters().total(), 1);
    }

    #[test]
    fn locked_directory_fails_pass() {
        let dir = tempfile::tempdir().unwrap();
        let remote = InProcessRemote::new();
        let engine = engine(dir.path(), &remote);

        let _held = DirLock::acquire(dir.path()).unwrap();
        assert!(matches!(engine.sync(), Err(SyncError::DirectoryLocked(_))));
        assert_eq!(remote.counters().total(), 0);
    }

    #[test]
    fn unsafe_server_filename_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let remote = InProcessRemote::new();
        remote
            .meta_store()
            .update_file(FileMetaData::new("../escape", 1, vec!["h".into()]))
            .unwrap();

        let report = engine(dir.path(), &remote).sync().unwrap();
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "../escape");
        assert!(!dir.path().parent().unwrap().join("escape").exists());
    }

    #[test]
    fn missing_block_keeps_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let remote = InProcessRemote::new();
        remote
            .meta_store()
            .update_file(FileMetaData::new("b.txt", 1, vec![block_hash(b"nowhere")]))
            .unwrap();

        let engine = engine(dir.path(), &remote);
        let report = engine.sync().unwrap();
        assert_eq!(report.failed.len(), 1);
        assert!(!dir.path().join("b.txt").exists());
        assert!(!dir.path().join("b.txt.surfsync-part").exists());

        let index = load_index(&engine.config().index_path()).unwrap();
        assert!(!index.contains_key("b.txt"));
    }
}
