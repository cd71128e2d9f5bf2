//! Snapshot storage implementations.

pub mod atomic_file;
pub mod codec;
pub mod file_snapshot_store;
pub mod memory_snapshot_store;

pub use atomic_file::{AtomicFile, AtomicFileError};
pub use file_snapshot_store::FileSnapshotStore;
pub use memory_snapshot_store::MemorySnapshotStore;
