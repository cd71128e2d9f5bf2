//! Field-level last-writer-wins reconciliation of one slice.
//!
//! Given the local slice and the freshly fetched remote state, builds the
//! row set both sides should hold afterwards:
//!
//! - records tombstoned locally are dropped (delete wins)
//! - records with local edits are merged field by field; if the remote
//!   revision has not moved since the last sync the local values are kept
//!   as they are (pure push)
//! - remote-only records are pulled as creates
//! - local records the remote has never seen are pushed as creates
//! - synced records the remote no longer has are dropped, unless they carry
//!   local edits, in which case they are pushed again
//!
//! Rows keep the remote order, followed by local-only rows in local order.

use bizdash_core::{
    ConflictRecord, FieldValue, Record, RemoteRow, RemoteSlice, Resolution, Slice, Timestamp,
};
use std::collections::BTreeSet;

/// The agreed row set for one slice.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    pub rows: Vec<RemoteRow>,
    pub conflicts: Vec<ConflictRecord>,
    /// The remote does not hold `rows` yet
    pub push_needed: bool,
    /// The local slice does not hold `rows` yet
    pub local_changed: bool,
}

/// True if the remote may hold changes the local slice has not seen.
pub fn remote_moved(local: &Slice, remote: &RemoteSlice) -> bool {
    local.needs_resync || local.remote_revision.as_deref() != Some(remote.revision.as_str())
}

pub fn reconcile(local: &Slice, remote: &RemoteSlice) -> Reconciliation {
    let moved = remote_moved(local, remote);
    let mut rows = Vec::with_capacity(remote.rows.len());
    let mut conflicts = Vec::new();
    let mut remote_keys = BTreeSet::new();

    for remote_row in &remote.rows {
        remote_keys.insert(remote_row.key.as_str());
        if local.is_locally_deleted(&remote_row.key) {
            continue;
        }
        match local.record(&remote_row.key) {
            Some(record) if !record.edited_fields.is_empty() => {
                let change = if moved {
                    RemoteChange::At(remote.per_record_modified_at.get(&remote_row.key).copied())
                } else {
                    RemoteChange::Unchanged
                };
                rows.push(merge_record(
                    local,
                    record,
                    remote_row,
                    change,
                    &mut conflicts,
                ));
            }
            _ => rows.push(remote_row.clone()),
        }
    }

    for record in &local.rows {
        if remote_keys.contains(record.key.as_str()) {
            continue;
        }
        if !record.synced || !record.edited_fields.is_empty() {
            rows.push(RemoteRow::from(record));
        }
    }

    let local_rows: Vec<RemoteRow> = local.rows.iter().map(RemoteRow::from).collect();
    Reconciliation {
        push_needed: rows != remote.rows,
        local_changed: rows != local_rows,
        rows,
        conflicts,
    }
}

/// What is known about the remote copy of one record.
#[derive(Debug, Clone, Copy)]
enum RemoteChange {
    /// Revision unchanged since the last sync
    Unchanged,
    /// Revision moved; per-record modification time if the service reports one
    At(Option<Timestamp>),
}

/// Merges one locally edited record with its remote counterpart.
///
/// Only fields in `edited_fields` can conflict; every other field takes the
/// remote value. An edited field whose remote record has not changed since
/// the last sync keeps the local value without a conflict.
fn merge_record(
    slice: &Slice,
    record: &Record,
    remote_row: &RemoteRow,
    change: RemoteChange,
    conflicts: &mut Vec<ConflictRecord>,
) -> RemoteRow {
    let mut fields = remote_row.fields.clone();
    let (remote_changed, remote_at) = match change {
        RemoteChange::Unchanged => (false, None),
        RemoteChange::At(at) => match (at, slice.last_synced_at) {
            (Some(modified), Some(synced)) => (modified > synced, at),
            _ => (true, at),
        },
    };

    for field in &record.edited_fields {
        let local_value = record.fields.get(field);
        let remote_value = remote_row.fields.get(field);
        if local_value == remote_value {
            continue;
        }
        if !remote_changed {
            set_field(&mut fields, field, local_value.cloned());
            continue;
        }

        let local_wins = match (record.edited_at, remote_at) {
            (Some(local_at), Some(remote_at)) => local_at > remote_at,
            (_, None) => true,
            (None, Some(_)) => false,
        };

        let (resolved, resolution) = match (local_value, remote_value) {
            (Some(FieldValue::Object(l)), Some(FieldValue::Object(r))) => {
                let (winner, loser) = if local_wins { (l, r) } else { (r, l) };
                let mut merged = loser.clone();
                for (key, value) in winner {
                    merged.insert(key.clone(), value.clone());
                }
                (Some(FieldValue::Object(merged)), Resolution::Merged)
            }
            _ if local_wins => (local_value.cloned(), Resolution::LocalWins),
            _ => (remote_value.cloned(), Resolution::RemoteWins),
        };

        set_field(&mut fields, field, resolved.clone());
        conflicts.push(ConflictRecord {
            slice_name: slice.name.clone(),
            record_key: record.key.clone(),
            field: field.clone(),
            local_value: local_value.cloned(),
            remote_value: remote_value.cloned(),
            resolved_value: resolved,
            resolution,
        });
    }

    RemoteRow::new(remote_row.key.clone(), fields)
}

fn set_field(fields: &mut bizdash_core::Fields, field: &str, value: Option<FieldValue>) {
    match value {
        Some(value) => {
            fields.insert(field.to_string(), value);
        }
        None => {
            fields.remove(field);
        }
    }
}
