//! Builds the store and its collaborators from configuration.

use anyhow::{Context, Result};
use bizdash_application::{LoadReport, StateStore, SyncEngine};
use bizdash_core::config::DashboardConfig;
use bizdash_core::{Clock, SheetService, SnapshotStore, SystemClock};
use bizdash_infrastructure::{BizdashPaths, ConfigService, FileSnapshotStore, HttpSheetService};
use std::path::PathBuf;
use std::sync::Arc;

pub struct App {
    pub config: DashboardConfig,
    pub persistence: Arc<FileSnapshotStore>,
    pub store: Arc<StateStore>,
    pub clock: Arc<dyn Clock>,
}

impl App {
    pub async fn open(config_path: Option<PathBuf>) -> Result<Self> {
        let service = match config_path {
            Some(path) => ConfigService::with_path(path),
            None => ConfigService::new(),
        };
        let config = service.get_config().context("Failed to load configuration")?;

        let dir = match &config.storage.dir {
            Some(dir) => dir.clone(),
            None => BizdashPaths::snapshot_dir().context("Failed to resolve data directory")?,
        };
        let persistence = Arc::new(FileSnapshotStore::new(dir, config.storage.audit_depth));
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(StateStore::from_config(
            &config,
            persistence.clone() as Arc<dyn SnapshotStore>,
            clock.clone(),
        ));

        match store.load().await.context("Failed to load state")? {
            LoadReport::Corrupt { reason } => {
                eprintln!("⚠️  Saved state was unreadable ({}); run `bizdash sync` to restore it", reason);
                if let Ok(files) = persistence.quarantined_files() {
                    if let Some(last) = files.last() {
                        eprintln!("   Unreadable copy kept at {}", last.display());
                    }
                }
            }
            LoadReport::Unavailable { message } => {
                eprintln!("⚠️  Saved state could not be read: {}", message);
            }
            LoadReport::Fresh | LoadReport::Restored { .. } => {}
        }

        Ok(Self {
            config,
            persistence,
            store,
            clock,
        })
    }

    pub fn engine(&self) -> Result<Arc<SyncEngine>> {
        let sheet: Arc<dyn SheetService> = Arc::new(
            HttpSheetService::from_config(&self.config.sync)
                .context("Sync is not configured (set sync.base_url or BIZDASH_SHEET_URL)")?,
        );
        Ok(Arc::new(SyncEngine::new(
            self.store.clone(),
            sheet,
            self.clock.clone(),
        )))
    }
}
