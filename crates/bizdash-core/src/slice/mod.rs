//! Slice domain: named units of business data and their records.

mod merge;
mod model;

pub use merge::SyncPatch;
pub use model::{FieldValue, Fields, Record, Slice, SliceSyncSummary, SyncOutcome};
