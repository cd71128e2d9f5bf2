//! Configuration model.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Slices registered when no configuration file says otherwise.
pub const DEFAULT_SLICES: &[&str] = &[
    "revenue",
    "expenses",
    "hr",
    "sales_pipeline",
    "okrs",
    "marketing",
];

/// Root of `config.toml`.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct DashboardConfig {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default = "default_slices")]
    pub slices: Vec<String>,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig::default(),
            sync: SyncConfig::default(),
            slices: default_slices(),
            schema_version: default_schema_version(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct StorageConfig {
    /// Snapshot directory; platform data dir when unset
    #[serde(default)]
    pub dir: Option<PathBuf>,
    /// Number of snapshot versions kept in the audit trail
    #[serde(default = "default_audit_depth")]
    pub audit_depth: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            dir: None,
            audit_depth: default_audit_depth(),
        }
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
pub struct SyncConfig {
    /// Base URL of the sheet service
    #[serde(default)]
    pub base_url: Option<String>,
    /// Environment variable holding the bearer token
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Run a pass as soon as the scheduler starts instead of after one interval
    #[serde(default = "default_true")]
    pub auto_start: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            api_key_env: default_api_key_env(),
            interval_secs: default_interval_secs(),
            request_timeout_secs: default_request_timeout_secs(),
            auto_start: true,
        }
    }
}

fn default_slices() -> Vec<String> {
    DEFAULT_SLICES.iter().map(|s| s.to_string()).collect()
}

fn default_schema_version() -> u32 {
    1
}

fn default_audit_depth() -> usize {
    10
}

fn default_api_key_env() -> String {
    "BIZDASH_SHEET_TOKEN".to_string()
}

fn default_interval_secs() -> u64 {
    60
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_true() -> bool {
    true
}
