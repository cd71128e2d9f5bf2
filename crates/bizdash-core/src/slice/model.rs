//! Slice and record domain models.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::clock::Timestamp;
use crate::edit::FieldPatches;
use crate::error::{BizdashError, Result};

/// A single field value: scalar or nested JSON value.
pub type FieldValue = serde_json::Value;

/// Field name to value mapping of one record.
pub type Fields = BTreeMap<String, FieldValue>;

/// One row of business data inside a slice.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    /// Key unique within the owning slice
    pub key: String,
    /// Field values
    #[serde(default)]
    pub fields: Fields,
    /// Time of the latest local edit not yet confirmed by a sync
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited_at: Option<Timestamp>,
    /// Fields changed locally since the last sync
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub edited_fields: BTreeSet<String>,
    /// Whether the external source has seen this record
    #[serde(default)]
    pub synced: bool,
}

impl Record {
    /// Creates a clean record as received from the external source.
    pub fn synced(key: impl Into<String>, fields: Fields) -> Self {
        Self {
            key: key.into(),
            fields,
            edited_at: None,
            edited_fields: BTreeSet::new(),
            synced: true,
        }
    }

    /// Creates a record that exists only locally.
    pub fn created_locally(key: impl Into<String>, fields: Fields, at: Timestamp) -> Self {
        let edited_fields = fields.keys().cloned().collect();
        Self {
            key: key.into(),
            fields,
            edited_at: Some(at),
            edited_fields,
            synced: false,
        }
    }

    /// Returns the value of a field.
    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// True if this record carries local changes that the external source has not seen.
    pub fn is_locally_modified(&self) -> bool {
        !self.synced || !self.edited_fields.is_empty()
    }

    /// Applies field patches as a local edit.
    pub fn apply_patches(&mut self, patches: &FieldPatches, at: Timestamp) {
        for (field, value) in patches {
            self.fields.insert(field.clone(), value.clone());
            self.edited_fields.insert(field.clone());
        }
        self.edited_at = Some(self.edited_at.map_or(at, |prev| prev.max(at)));
    }
}

/// Result of the latest sync step for a slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncOutcome {
    /// Nothing changed on either side
    NoOp,
    /// Remote rows replaced local rows
    Pulled,
    /// Local rows were sent to the remote
    Pushed,
    /// Both sides changed and were reconciled
    Merged,
    /// The step failed; local state was left untouched
    Failed,
}

/// Sync summary retained in slice metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceSyncSummary {
    pub at: Timestamp,
    pub outcome: SyncOutcome,
    #[serde(default)]
    pub conflicts: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A named, independently addressable unit of business data.
///
/// Slices are immutable once published by the store; every mutation builds a
/// new slice value and swaps it into the next snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Slice {
    /// Unique slice name (e.g. "revenue", "expenses")
    pub name: String,
    /// Ordered records
    #[serde(default)]
    pub rows: Vec<Record>,
    pub schema_version: u32,
    #[serde(default)]
    pub last_local_edit_at: Option<Timestamp>,
    #[serde(default)]
    pub last_synced_at: Option<Timestamp>,
    /// True if locally modified since the last successful push
    #[serde(default)]
    pub dirty: bool,
    /// Opaque revision token of the external source at the last sync
    #[serde(default)]
    pub remote_revision: Option<String>,
    /// Records deleted locally since the last sync, with the deletion time
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub deleted_keys: BTreeMap<String, Timestamp>,
    /// Set when local data cannot be trusted and must be pulled in full
    #[serde(default)]
    pub needs_resync: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<SliceSyncSummary>,
}

impl Slice {
    /// Creates an empty, clean slice.
    pub fn new(name: impl Into<String>, schema_version: u32) -> Self {
        Self {
            name: name.into(),
            rows: Vec::new(),
            schema_version,
            last_local_edit_at: None,
            last_synced_at: None,
            dirty: false,
            remote_revision: None,
            deleted_keys: BTreeMap::new(),
            needs_resync: false,
            last_sync: None,
        }
    }

    /// Returns the record with the given key.
    pub fn record(&self, key: &str) -> Option<&Record> {
        self.rows.iter().find(|r| r.key == key)
    }

    fn record_mut(&mut self, key: &str) -> Option<&mut Record> {
        self.rows.iter_mut().find(|r| r.key == key)
    }

    /// Applies field patches to one record as a local edit committed at `now`.
    ///
    /// The record keeps `originated_at` as its edit time, capped at `now` so a
    /// future-dated command cannot win later comparisons.
    pub fn apply_patches(
        &mut self,
        key: &str,
        patches: &FieldPatches,
        originated_at: Timestamp,
        now: Timestamp,
    ) -> Result<()> {
        let name = self.name.clone();
        let record = self
            .record_mut(key)
            .ok_or_else(|| BizdashError::unknown_record(name, key))?;
        record.apply_patches(patches, originated_at.min(now));
        self.mark_edited(now);
        Ok(())
    }

    /// Appends a locally created record.
    pub fn insert_record(&mut self, key: &str, fields: Fields, at: Timestamp) -> Result<()> {
        if self.record(key).is_some() {
            return Err(BizdashError::DuplicateRecord {
                slice: self.name.clone(),
                record_key: key.to_string(),
            });
        }
        // Re-creating a key deleted earlier in this sync window cancels the delete.
        let mut record = Record::created_locally(key, fields, at);
        record.synced = self.deleted_keys.remove(key).is_some();
        self.rows.push(record);
        self.mark_edited(at);
        Ok(())
    }

    /// Removes a record and leaves a tombstone for the next sync.
    pub fn delete_record(&mut self, key: &str, at: Timestamp) -> Result<Record> {
        let index = self
            .rows
            .iter()
            .position(|r| r.key == key)
            .ok_or_else(|| BizdashError::unknown_record(&self.name, key))?;
        let removed = self.rows.remove(index);
        if removed.synced {
            self.deleted_keys.insert(key.to_string(), at);
        }
        self.mark_edited(at);
        Ok(removed)
    }

    fn mark_edited(&mut self, now: Timestamp) {
        self.last_local_edit_at = Some(now);
        self.dirty = true;
    }

    /// Recomputes the dirty flag from record state and tombstones.
    pub fn recompute_dirty(&mut self) {
        self.dirty =
            !self.deleted_keys.is_empty() || self.rows.iter().any(Record::is_locally_modified);
    }

    /// True if the key was deleted locally since the last sync.
    pub fn is_locally_deleted(&self, key: &str) -> bool {
        self.deleted_keys.contains_key(key)
    }

    /// Checks the structural invariants of a slice.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("slice name is empty".to_string());
        }
        let mut seen = BTreeSet::new();
        for record in &self.rows {
            if record.key.is_empty() {
                return Err(format!("slice '{}' has a record with an empty key", self.name));
            }
            if !seen.insert(record.key.as_str()) {
                return Err(format!(
                    "slice '{}' has duplicate record key '{}'",
                    self.name, record.key
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::timestamp_secs;
    use serde_json::json;

    fn fields(pairs: &[(&str, FieldValue)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_new_slice_is_clean() {
        let slice = Slice::new("revenue", 1);
        assert!(!slice.dirty);
        assert!(slice.rows.is_empty());
        assert!(slice.remote_revision.is_none());
    }

    #[test]
    fn test_apply_patches_marks_dirty() {
        let mut slice = Slice::new("expenses", 1);
        slice
            .rows
            .push(Record::synced("r1", fields(&[("amount", json!(100))])));

        let mut patches = FieldPatches::new();
        patches.insert("amount".to_string(), json!(500));
        slice
            .apply_patches("r1", &patches, timestamp_secs(10), timestamp_secs(10))
            .unwrap();

        let record = slice.record("r1").unwrap();
        assert_eq!(record.get("amount"), Some(&json!(500)));
        assert!(record.edited_fields.contains("amount"));
        assert_eq!(record.edited_at, Some(timestamp_secs(10)));
        assert!(slice.dirty);
        assert_eq!(slice.last_local_edit_at, Some(timestamp_secs(10)));
    }

    #[test]
    fn test_apply_patches_caps_edit_time_at_now() {
        let mut slice = Slice::new("expenses", 1);
        slice
            .rows
            .push(Record::synced("r1", fields(&[("amount", json!(100))])));
        let mut patches = FieldPatches::new();
        patches.insert("amount".to_string(), json!(500));

        slice
            .apply_patches("r1", &patches, timestamp_secs(9_999), timestamp_secs(40))
            .unwrap();
        assert_eq!(slice.record("r1").unwrap().edited_at, Some(timestamp_secs(40)));
        assert_eq!(slice.last_local_edit_at, Some(timestamp_secs(40)));

        slice
            .apply_patches("r1", &patches, timestamp_secs(3), timestamp_secs(50))
            .unwrap();
        assert_eq!(slice.record("r1").unwrap().edited_at, Some(timestamp_secs(40)));
        assert_eq!(slice.last_local_edit_at, Some(timestamp_secs(50)));
    }

    #[test]
    fn test_apply_patches_unknown_record() {
        let mut slice = Slice::new("expenses", 1);
        let err = slice
            .apply_patches("missing", &FieldPatches::new(), timestamp_secs(1), timestamp_secs(1))
            .unwrap_err();
        assert!(matches!(err, BizdashError::UnknownRecord { .. }));
        assert!(!slice.dirty);
    }

    #[test]
    fn test_delete_synced_record_leaves_tombstone() {
        let mut slice = Slice::new("hr", 1);
        slice.rows.push(Record::synced("e1", Fields::new()));
        slice.delete_record("e1", timestamp_secs(5)).unwrap();

        assert!(slice.record("e1").is_none());
        assert!(slice.is_locally_deleted("e1"));
        assert!(slice.dirty);
    }

    #[test]
    fn test_delete_local_only_record_needs_no_tombstone() {
        let mut slice = Slice::new("hr", 1);
        slice
            .insert_record("e2", Fields::new(), timestamp_secs(1))
            .unwrap();
        slice.delete_record("e2", timestamp_secs(2)).unwrap();

        assert!(!slice.is_locally_deleted("e2"));
        slice.recompute_dirty();
        assert!(!slice.dirty);
    }

    #[test]
    fn test_insert_duplicate_rejected() {
        let mut slice = Slice::new("okrs", 1);
        slice.rows.push(Record::synced("o1", Fields::new()));
        let err = slice
            .insert_record("o1", Fields::new(), timestamp_secs(1))
            .unwrap_err();
        assert!(matches!(err, BizdashError::DuplicateRecord { .. }));
    }

    #[test]
    fn test_validate_duplicate_keys() {
        let mut slice = Slice::new("marketing", 1);
        slice.rows.push(Record::synced("m1", Fields::new()));
        slice.rows.push(Record::synced("m1", Fields::new()));
        assert!(slice.validate().is_err());
    }
}
