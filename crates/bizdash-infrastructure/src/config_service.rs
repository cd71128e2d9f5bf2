//! Configuration service implementation.
//!
//! Loads the dashboard configuration from `config.toml` and applies
//! environment overrides.

use bizdash_core::config::DashboardConfig;
use bizdash_core::{BizdashError, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use crate::paths::BizdashPaths;

/// Overrides `sync.base_url` when set.
pub const SHEET_URL_ENV: &str = "BIZDASH_SHEET_URL";

/// Loads and caches the dashboard configuration.
#[derive(Debug, Clone)]
pub struct ConfigService {
    path: Option<PathBuf>,
    config: Arc<RwLock<Option<DashboardConfig>>>,
}

impl ConfigService {
    /// Creates a service reading the platform config file.
    pub fn new() -> Self {
        Self {
            path: None,
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Creates a service reading an explicit file.
    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            config: Arc::new(RwLock::new(None)),
        }
    }

    /// Gets the configuration, loading from file if not cached.
    ///
    /// A missing file yields defaults; a malformed one is an error.
    pub fn get_config(&self) -> Result<DashboardConfig> {
        if let Ok(read_lock) = self.config.read() {
            if let Some(cached) = read_lock.as_ref() {
                return Ok(cached.clone());
            }
        }

        let path = self.config_path()?;
        let mut loaded = Self::load_file(&path)?;
        Self::apply_env_overrides(&mut loaded, |key| std::env::var(key).ok());

        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = Some(loaded.clone());
        }
        Ok(loaded)
    }

    /// Invalidates the cache, forcing a reload on next access.
    pub fn invalidate_cache(&self) {
        if let Ok(mut write_lock) = self.config.write() {
            *write_lock = None;
        }
    }

    fn config_path(&self) -> Result<PathBuf> {
        match &self.path {
            Some(path) => Ok(path.clone()),
            None => Ok(BizdashPaths::config_file()?),
        }
    }

    fn load_file(path: &Path) -> Result<DashboardConfig> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(
                    "[ConfigService] No config at {:?}, using defaults",
                    path
                );
                return Ok(DashboardConfig::default());
            }
            Err(e) => return Err(e.into()),
        };

        toml::from_str(&content)
            .map_err(|e| BizdashError::config(format!("{}: {}", path.display(), e)))
    }

    fn apply_env_overrides(config: &mut DashboardConfig, env: impl Fn(&str) -> Option<String>) {
        if let Some(url) = env(SHEET_URL_ENV).filter(|v| !v.trim().is_empty()) {
            tracing::debug!("[ConfigService] sync.base_url overridden by {}", SHEET_URL_ENV);
            config.sync.base_url = Some(url);
        }
    }
}

impl Default for ConfigService {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let temp_dir = TempDir::new().unwrap();
        let config = ConfigService::load_file(&temp_dir.path().join("config.toml")).unwrap();
        assert_eq!(config, DashboardConfig::default());
    }

    #[test]
    fn test_reads_and_caches_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "slices = [\"revenue\"]\n[storage]\naudit_depth = 3\n").unwrap();

        let service = ConfigService::with_path(&path);
        let config = service.get_config().unwrap();
        assert_eq!(config.slices, vec!["revenue"]);
        assert_eq!(config.storage.audit_depth, 3);

        std::fs::write(&path, "slices = [\"hr\"]\n").unwrap();
        assert_eq!(service.get_config().unwrap().slices, vec!["revenue"]);

        service.invalidate_cache();
        assert_eq!(service.get_config().unwrap().slices, vec!["hr"]);
    }

    #[test]
    fn test_malformed_file_is_config_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.toml");
        std::fs::write(&path, "slices = [unterminated").unwrap();

        let err = ConfigService::with_path(&path).get_config().unwrap_err();
        assert!(matches!(err, BizdashError::Config(_)));
    }

    #[test]
    fn test_env_override() {
        let mut config = DashboardConfig::default();
        ConfigService::apply_env_overrides(&mut config, |key| {
            (key == SHEET_URL_ENV).then(|| "https://sheets.internal".to_string())
        });
        assert_eq!(config.sync.base_url.as_deref(), Some("https://sheets.internal"));
    }
}
