//! Version-stamped state snapshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::clock::Timestamp;
use crate::slice::Slice;

/// The complete state (all slices) at one logical point in time.
///
/// Slices are shared behind `Arc` so that publishing a new snapshot only
/// copies the slice that changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct StateSnapshot {
    /// Strictly increasing; incremented on every committed mutation
    pub snapshot_version: u64,
    #[serde(default)]
    pub slices: BTreeMap<String, Arc<Slice>>,
    /// Set by the persistence layer when the snapshot is written
    #[serde(default)]
    pub saved_at: Option<Timestamp>,
}

impl StateSnapshot {
    /// Creates an empty snapshot at version 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Returns the slice with the given name.
    pub fn slice(&self, name: &str) -> Option<&Arc<Slice>> {
        self.slices.get(name)
    }

    /// Returns the registered slice names in order.
    pub fn slice_names(&self) -> Vec<String> {
        self.slices.keys().cloned().collect()
    }

    /// Returns a copy with `slice` swapped in and the version bumped.
    pub fn with_slice(&self, slice: Slice) -> Self {
        let mut next = self.clone();
        next.slices.insert(slice.name.clone(), Arc::new(slice));
        next.snapshot_version = self.snapshot_version + 1;
        next
    }

    /// Checks structural invariants: every slice is stored under its own name
    /// and is internally consistent.
    pub fn validate(&self) -> Result<(), String> {
        for (name, slice) in &self.slices {
            if name != &slice.name {
                return Err(format!(
                    "slice stored under '{}' is named '{}'",
                    name, slice.name
                ));
            }
            slice.validate()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_slice_bumps_version() {
        let snapshot = StateSnapshot::empty();
        let next = snapshot.with_slice(Slice::new("revenue", 1));

        assert_eq!(snapshot.snapshot_version, 0);
        assert_eq!(next.snapshot_version, 1);
        assert!(next.slice("revenue").is_some());
        assert!(snapshot.slice("revenue").is_none());
    }

    #[test]
    fn test_validate_detects_misfiled_slice() {
        let mut snapshot = StateSnapshot::empty();
        snapshot
            .slices
            .insert("revenue".to_string(), Arc::new(Slice::new("expenses", 1)));
        assert!(snapshot.validate().is_err());
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = StateSnapshot::empty()
            .with_slice(Slice::new("revenue", 1))
            .with_slice(Slice::new("hr", 2));

        let json = serde_json::to_string(&snapshot).unwrap();
        let restored: StateSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, snapshot);
    }
}
