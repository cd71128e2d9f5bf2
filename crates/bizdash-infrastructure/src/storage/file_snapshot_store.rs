//! File-backed snapshot store.
//!
//! # Directory Structure
//!
//! ```text
//! <dir>/
//! ├── latest.json                       # Single "latest" slot
//! ├── audit/
//! │   ├── snapshot-00000000000000000041.json
//! │   └── snapshot-00000000000000000042.json
//! └── quarantine/
//!     └── latest-1700000000000.json     # Bytes that failed validation
//! ```

use bizdash_core::{BizdashError, Result, SnapshotStore, StateSnapshot};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use super::atomic_file::AtomicFile;
use super::codec::{decode_snapshot, encode_snapshot};

const LATEST_FILE: &str = "latest.json";
const AUDIT_DIR: &str = "audit";
const QUARANTINE_DIR: &str = "quarantine";
const AUDIT_PREFIX: &str = "snapshot-";

/// Snapshot store writing JSON files to a local directory.
#[derive(Debug, Clone)]
pub struct FileSnapshotStore {
    dir: PathBuf,
    latest: AtomicFile,
    audit_depth: usize,
}

impl FileSnapshotStore {
    /// Creates a store rooted at `dir`, keeping `audit_depth` audit versions.
    pub fn new(dir: impl Into<PathBuf>, audit_depth: usize) -> Self {
        let dir = dir.into();
        let latest = AtomicFile::new(dir.join(LATEST_FILE));
        Self {
            dir,
            latest,
            audit_depth,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn audit_dir(&self) -> PathBuf {
        self.dir.join(AUDIT_DIR)
    }

    fn audit_path(&self, version: u64) -> PathBuf {
        self.audit_dir()
            .join(format!("{}{:020}.json", AUDIT_PREFIX, version))
    }

    /// Files moved aside because they failed validation, oldest first.
    pub fn quarantined_files(&self) -> Result<Vec<PathBuf>> {
        let dir = self.dir.join(QUARANTINE_DIR);
        let mut files = match fs::read_dir(&dir) {
            Ok(entries) => entries
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .collect::<Vec<_>>(),
            Err(e) if e.kind() == ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        files.sort();
        Ok(files)
    }

    /// Copies unreadable bytes aside so the next save cannot destroy them.
    fn quarantine(&self, raw: &[u8]) {
        let dir = self.dir.join(QUARANTINE_DIR);
        let path = dir.join(format!(
            "latest-{}.json",
            chrono::Utc::now().timestamp_millis()
        ));
        let result = fs::create_dir_all(&dir).and_then(|_| fs::write(&path, raw));
        match result {
            Ok(()) => tracing::warn!(
                "[FileSnapshotStore] Quarantined {} unreadable bytes at {:?}",
                raw.len(),
                path
            ),
            Err(e) => tracing::error!(
                "[FileSnapshotStore] Failed to quarantine unreadable snapshot: {}",
                e
            ),
        }
    }

    fn write_audit(&self, snapshot: &StateSnapshot, bytes: &[u8]) -> Result<()> {
        if self.audit_depth == 0 {
            return Ok(());
        }
        AtomicFile::new(self.audit_path(snapshot.snapshot_version)).write(bytes)?;

        let versions = self.audit_versions()?;
        if versions.len() > self.audit_depth {
            let excess = versions.len() - self.audit_depth;
            for version in &versions[..excess] {
                let path = self.audit_path(*version);
                fs::remove_file(&path)?;
                let _ = fs::remove_file(path.with_extension("lock"));
            }
        }
        Ok(())
    }
}

impl SnapshotStore for FileSnapshotStore {
    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        let bytes = encode_snapshot(snapshot)?;
        self.latest.write(&bytes)?;

        // The latest slot is authoritative; a missed audit entry only
        // narrows the recovery window.
        if let Err(e) = self.write_audit(snapshot, &bytes) {
            tracing::warn!(
                "[FileSnapshotStore] Failed to write audit entry for version {}: {}",
                snapshot.snapshot_version,
                e
            );
        }

        tracing::debug!(
            "[FileSnapshotStore] Saved snapshot version {} ({} bytes)",
            snapshot.snapshot_version,
            bytes.len()
        );
        Ok(())
    }

    fn load(&self) -> Result<StateSnapshot> {
        let bytes = self
            .latest
            .read()?
            .ok_or_else(|| BizdashError::not_found("Snapshot", LATEST_FILE))?;

        match decode_snapshot(&bytes) {
            Ok(snapshot) => Ok(snapshot),
            Err(err) => {
                if err.is_corrupt() {
                    self.quarantine(&bytes);
                }
                Err(err)
            }
        }
    }

    fn audit_versions(&self) -> Result<Vec<u64>> {
        let entries = match fs::read_dir(self.audit_dir()) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions: Vec<u64> = entries
            .filter_map(|entry| entry.ok())
            .filter_map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                name.strip_prefix(AUDIT_PREFIX)?
                    .strip_suffix(".json")?
                    .parse()
                    .ok()
            })
            .collect();
        versions.sort_unstable();
        Ok(versions)
    }

    fn load_audit(&self, version: u64) -> Result<StateSnapshot> {
        let bytes = AtomicFile::new(self.audit_path(version))
            .read()?
            .ok_or_else(|| BizdashError::not_found("AuditSnapshot", version.to_string()))?;
        decode_snapshot(&bytes)
    }
}
