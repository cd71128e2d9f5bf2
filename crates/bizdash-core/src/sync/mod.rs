//! Synchronization vocabulary shared by the engine and sheet adapters.

mod model;
mod service;

pub use model::{
    ConflictRecord, FailureKind, RemoteRow, RemoteSlice, Resolution, SessionSummary,
    SliceFailure, SyncSession,
};
pub use service::SheetService;
