//! Folding reconciled remote rows back into a slice.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::model::{Record, Slice, SliceSyncSummary};
use crate::sync::RemoteRow;

/// Reconciled rows handed to the store at the end of a slice sync step.
#[derive(Debug, Clone)]
pub struct SyncPatch {
    /// Rows the external source now holds
    pub rows: Vec<RemoteRow>,
    /// Revision token of the external source after this step
    pub revision: String,
    /// The slice as it was when the step read it
    pub base: Arc<Slice>,
    /// Summary to retain in slice metadata
    pub summary: SliceSyncSummary,
}

impl Slice {
    /// Builds the slice that results from accepting `patch` as the remote state.
    ///
    /// Anything that changed locally after `patch.base` was read is not
    /// covered by the patch: edited fields are overlaid on the remote values
    /// and stay dirty, records created meanwhile are kept, and deletes made
    /// meanwhile win over the remote row. Everything else becomes clean.
    pub fn absorb_remote(&self, patch: &SyncPatch) -> Slice {
        let base = patch.base.as_ref();
        let at = patch.summary.at;
        let mut rows = Vec::with_capacity(patch.rows.len());
        let mut remote_keys = BTreeSet::new();
        let mut deleted_keys = self
            .deleted_keys
            .iter()
            .filter(|(key, _)| !base.deleted_keys.contains_key(*key))
            .map(|(k, v)| (k.clone(), *v))
            .collect::<std::collections::BTreeMap<_, _>>();

        for remote in &patch.rows {
            remote_keys.insert(remote.key.as_str());
            if deleted_keys.contains_key(&remote.key) {
                continue;
            }

            let before = base.record(&remote.key);
            let record = match self.record(&remote.key) {
                Some(local) if before != Some(local) => overlay(remote, local, before),
                Some(_) => Record::synced(remote.key.clone(), remote.fields.clone()),
                None if before.is_some() => {
                    // Deleted after the step read the slice; the remote copy
                    // exists now, so the delete has to be pushed.
                    deleted_keys.insert(remote.key.clone(), at);
                    continue;
                }
                None => Record::synced(remote.key.clone(), remote.fields.clone()),
            };
            rows.push(record);
        }

        for local in &self.rows {
            if !remote_keys.contains(local.key.as_str()) && base.record(&local.key) != Some(local) {
                rows.push(local.clone());
            }
        }

        let mut next = Slice {
            name: self.name.clone(),
            rows,
            schema_version: self.schema_version,
            last_local_edit_at: self.last_local_edit_at,
            last_synced_at: Some(at),
            dirty: false,
            remote_revision: Some(patch.revision.clone()),
            deleted_keys,
            needs_resync: false,
            last_sync: Some(patch.summary.clone()),
        };
        next.recompute_dirty();
        next
    }
}

/// Lays fields edited since `before` over the remote values.
fn overlay(remote: &RemoteRow, local: &Record, before: Option<&Record>) -> Record {
    let mut fields = remote.fields.clone();
    let mut edited_fields = BTreeSet::new();
    for field in &local.edited_fields {
        let value = local.fields.get(field);
        if before.is_some_and(|b| b.fields.get(field) == value) {
            continue;
        }
        match value {
            Some(value) => fields.insert(field.clone(), value.clone()),
            None => fields.remove(field),
        };
        edited_fields.insert(field.clone());
    }

    Record {
        key: remote.key.clone(),
        fields,
        edited_at: if edited_fields.is_empty() {
            None
        } else {
            local.edited_at
        },
        edited_fields,
        synced: true,
    }
}
