//! Infrastructure layer for Bizdash: snapshot storage, sheet service
//! adapters, configuration loading and platform paths.

pub mod config_service;
pub mod paths;
pub mod sheet;
pub mod storage;

pub use crate::config_service::ConfigService;
pub use crate::paths::BizdashPaths;
pub use crate::sheet::{HttpSheetService, InMemorySheetService, InjectedFailure};
pub use crate::storage::{FileSnapshotStore, MemorySnapshotStore};
