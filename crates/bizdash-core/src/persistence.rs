//! Snapshot persistence port.

use crate::error::Result;
use crate::snapshot::StateSnapshot;

/// Durable storage of state snapshots on the local device.
///
/// Storage is single-slot ("latest", last write wins) plus an audit trail of
/// the most recent snapshot versions.
///
/// Methods are synchronous: the store persists inside its mutation step and
/// must not yield between mutating and recording.
pub trait SnapshotStore: Send + Sync {
    /// Writes `snapshot` as the latest state.
    ///
    /// Must be atomic: after a failure the previously saved snapshot is still
    /// returned by [`SnapshotStore::load`].
    fn save(&self, snapshot: &StateSnapshot) -> Result<()>;

    /// Returns the latest snapshot.
    ///
    /// # Errors
    ///
    /// - `NotFound` if nothing was ever saved
    /// - `Corrupt` with the raw bytes if the stored data fails validation
    /// - `PersistenceUnavailable` if the medium cannot be read at all
    fn load(&self) -> Result<StateSnapshot>;

    /// Snapshot versions held in the audit trail, oldest first.
    fn audit_versions(&self) -> Result<Vec<u64>>;

    /// Loads one snapshot from the audit trail.
    fn load_audit(&self, version: u64) -> Result<StateSnapshot>;
}
