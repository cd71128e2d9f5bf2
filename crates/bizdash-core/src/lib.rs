//! Domain layer for Bizdash.
//!
//! Holds the business-data model (slices, records, snapshots), the edit and
//! sync vocabulary, the shared error taxonomy, and the port traits that the
//! infrastructure layer implements.

pub mod clock;
pub mod config;
pub mod edit;
pub mod error;
pub mod persistence;
pub mod slice;
pub mod snapshot;
pub mod sync;

pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use edit::{EditCommand, FieldPatches};
pub use error::{BizdashError, Result};
pub use persistence::SnapshotStore;
pub use slice::{FieldValue, Fields, Record, Slice, SliceSyncSummary, SyncOutcome, SyncPatch};
pub use snapshot::StateSnapshot;
pub use sync::{
    ConflictRecord, FailureKind, RemoteRow, RemoteSlice, Resolution, SessionSummary, SheetService,
    SliceFailure, SyncSession,
};
