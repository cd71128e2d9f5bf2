//! Atomic file writes with exclusive locking.
//!
//! Provides a thin layer for safe replacement of snapshot files: readers see
//! either the old content or the new content, never a torn write.

use bizdash_core::BizdashError;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write as IoWrite};
use std::path::{Path, PathBuf};

/// Errors that can occur during atomic file operations.
#[derive(Debug)]
pub enum AtomicFileError {
    /// File I/O error.
    IoError(std::io::Error),
    /// File locking error.
    LockError(String),
}

impl std::fmt::Display for AtomicFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AtomicFileError::IoError(e) => write!(f, "I/O error: {}", e),
            AtomicFileError::LockError(e) => write!(f, "Lock error: {}", e),
        }
    }
}

impl std::error::Error for AtomicFileError {}

impl From<std::io::Error> for AtomicFileError {
    fn from(e: std::io::Error) -> Self {
        AtomicFileError::IoError(e)
    }
}

impl From<AtomicFileError> for BizdashError {
    fn from(e: AtomicFileError) -> Self {
        BizdashError::PersistenceUnavailable(e.to_string())
    }
}

/// A handle to a file that is only ever replaced whole.
///
/// Provides:
/// - **Atomicity**: Updates are all-or-nothing via tmp file + atomic rename
/// - **Isolation**: File locking prevents concurrent writers
/// - **Durability**: Explicit fsync before rename
#[derive(Debug, Clone)]
pub struct AtomicFile {
    path: PathBuf,
}

impl AtomicFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the whole file.
    ///
    /// # Returns
    ///
    /// - `Ok(Some(bytes))`: File exists (possibly empty)
    /// - `Ok(None)`: File doesn't exist
    /// - `Err`: File exists but could not be read
    pub fn read(&self) -> Result<Option<Vec<u8>>, AtomicFileError> {
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Replaces the file content atomically while holding the writer lock.
    pub fn write(&self, bytes: &[u8]) -> Result<(), AtomicFileError> {
        let _lock = FileLock::acquire(&self.path)?;

        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        // Write to temporary file in the same directory
        let tmp_path = self.temp_path()?;
        let mut tmp_file = File::create(&tmp_path)?;
        if let Err(e) = tmp_file.write_all(bytes).and_then(|_| tmp_file.sync_all()) {
            drop(tmp_file);
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }
        drop(tmp_file);

        // Atomic rename
        fs::rename(&tmp_path, &self.path)?;

        Ok(())
    }

    /// Gets a temporary file path for atomic writes.
    fn temp_path(&self) -> Result<PathBuf, AtomicFileError> {
        let parent = self.path.parent().ok_or_else(|| {
            AtomicFileError::IoError(std::io::Error::new(
                ErrorKind::InvalidInput,
                "Path has no parent directory",
            ))
        })?;

        let file_name = self.path.file_name().ok_or_else(|| {
            AtomicFileError::IoError(std::io::Error::new(
                ErrorKind::InvalidInput,
                "Path has no file name",
            ))
        })?;

        let tmp_name = format!(".{}.tmp", file_name.to_string_lossy());
        Ok(parent.join(tmp_name))
    }
}

/// A file lock guard that automatically releases the lock when dropped.
struct FileLock {
    #[allow(dead_code)]
    file: File,
}

impl FileLock {
    /// Acquires an exclusive lock next to the given path.
    fn acquire(path: &Path) -> Result<Self, AtomicFileError> {
        let lock_path = path.with_extension("lock");

        if let Some(parent) = lock_path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        #[cfg(unix)]
        {
            use fs2::FileExt;
            file.lock_exclusive()
                .map_err(|e| AtomicFileError::LockError(format!("Failed to acquire lock: {}", e)))?;
        }

        Ok(FileLock { file })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_and_read() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicFile::new(temp_dir.path().join("latest.json"));

        file.write(b"hello").unwrap();
        assert_eq!(file.read().unwrap().unwrap(), b"hello");

        file.write(b"world").unwrap();
        assert_eq!(file.read().unwrap().unwrap(), b"world");
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let file = AtomicFile::new(temp_dir.path().join("missing.json"));
        assert!(file.read().unwrap().is_none());
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("nested").join("latest.json");
        let file = AtomicFile::new(path.clone());

        file.write(b"{}").unwrap();

        assert!(path.exists());
        assert!(!temp_dir.path().join("nested").join(".latest.json.tmp").exists());
    }
}
