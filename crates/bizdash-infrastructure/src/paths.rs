//! Platform path resolution for bizdash files.
//!
//! # Directory Structure
//!
//! ```text
//! ~/.config/bizdash/           # Config directory
//! └── config.toml              # Application configuration
//!
//! ~/.local/share/bizdash/      # Data directory
//! └── snapshots/               # FileSnapshotStore root
//!     ├── latest.json
//!     ├── audit/
//!     └── quarantine/
//! ```

use std::path::PathBuf;

const APP_DIR: &str = "bizdash";

/// Errors that can occur during path resolution.
#[derive(Debug)]
pub enum PathError {
    /// Home directory could not be determined.
    HomeDirNotFound,
}

impl std::fmt::Display for PathError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathError::HomeDirNotFound => write!(f, "Cannot find home directory"),
        }
    }
}

impl std::error::Error for PathError {}

impl From<PathError> for bizdash_core::BizdashError {
    fn from(e: PathError) -> Self {
        bizdash_core::BizdashError::config(e.to_string())
    }
}

pub struct BizdashPaths;

impl BizdashPaths {
    /// Returns the bizdash configuration directory (e.g. `~/.config/bizdash/`).
    pub fn config_dir() -> Result<PathBuf, PathError> {
        dirs::config_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    /// Returns the bizdash data directory (e.g. `~/.local/share/bizdash/`).
    pub fn data_dir() -> Result<PathBuf, PathError> {
        dirs::data_dir()
            .map(|dir| dir.join(APP_DIR))
            .ok_or(PathError::HomeDirNotFound)
    }

    pub fn config_file() -> Result<PathBuf, PathError> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    /// Default root of the snapshot store.
    pub fn snapshot_dir() -> Result<PathBuf, PathError> {
        Ok(Self::data_dir()?.join("snapshots"))
    }
}
