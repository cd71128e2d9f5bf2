//! Synchronization session and conflict models.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use uuid::Uuid;

use crate::clock::Timestamp;
use crate::error::BizdashError;
use crate::slice::{FieldValue, Fields, Record, SyncOutcome};

/// One row as exchanged with the external sheet service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteRow {
    pub key: String,
    #[serde(default)]
    pub fields: Fields,
}

impl RemoteRow {
    pub fn new(key: impl Into<String>, fields: Fields) -> Self {
        Self {
            key: key.into(),
            fields,
        }
    }
}

impl From<&Record> for RemoteRow {
    fn from(record: &Record) -> Self {
        Self::new(record.key.clone(), record.fields.clone())
    }
}

/// Remote state of one slice as returned by `fetch_slice`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteSlice {
    pub rows: Vec<RemoteRow>,
    /// Opaque revision token
    pub revision: String,
    /// Modification time of each record as reported by the service
    #[serde(default)]
    pub per_record_modified_at: BTreeMap<String, Timestamp>,
}

impl RemoteSlice {
    pub fn row(&self, key: &str) -> Option<&RemoteRow> {
        self.rows.iter().find(|r| r.key == key)
    }
}

/// How a conflicting field was settled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    LocalWins,
    RemoteWins,
    /// Both values were nested objects and were combined key by key
    Merged,
}

/// A field changed on both sides since the last sync.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConflictRecord {
    pub slice_name: String,
    pub record_key: String,
    pub field: String,
    pub local_value: Option<FieldValue>,
    pub remote_value: Option<FieldValue>,
    /// Value kept after resolution
    pub resolved_value: Option<FieldValue>,
    pub resolution: Resolution,
}

/// Failure class of a slice step, used to pick retry behaviour and notices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ServiceUnavailable,
    AuthFailure,
    Persistence,
    Other,
}

/// Why a slice step failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SliceFailure {
    pub kind: FailureKind,
    pub message: String,
    /// A later pass may succeed without intervention
    #[serde(default)]
    pub retryable: bool,
}

impl From<&BizdashError> for SliceFailure {
    fn from(err: &BizdashError) -> Self {
        let kind = match err {
            BizdashError::ServiceUnavailable { .. } => FailureKind::ServiceUnavailable,
            BizdashError::AuthFailure { .. } => FailureKind::AuthFailure,
            BizdashError::CommitFailed(_)
            | BizdashError::PersistenceUnavailable(_)
            | BizdashError::Io { .. } => FailureKind::Persistence,
            _ => FailureKind::Other,
        };
        Self {
            kind,
            message: err.to_string(),
            retryable: err.is_retryable(),
        }
    }
}

/// One synchronization pass over some or all slices.
///
/// Never persisted; slices keep only a [`crate::slice::SliceSyncSummary`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSession {
    pub id: Uuid,
    pub started_at: Timestamp,
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
    pub slices_attempted: BTreeSet<String>,
    pub slices_succeeded: BTreeSet<String>,
    #[serde(default)]
    pub failures: BTreeMap<String, SliceFailure>,
    #[serde(default)]
    pub outcomes: BTreeMap<String, SyncOutcome>,
    pub conflicts: Vec<ConflictRecord>,
    /// Set when the pass stopped early at a cancellation checkpoint
    #[serde(default)]
    pub cancelled: bool,
}

impl SyncSession {
    pub fn new(started_at: Timestamp) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at,
            finished_at: None,
            slices_attempted: BTreeSet::new(),
            slices_succeeded: BTreeSet::new(),
            failures: BTreeMap::new(),
            outcomes: BTreeMap::new(),
            conflicts: Vec::new(),
            cancelled: false,
        }
    }

    pub fn record_success(&mut self, slice: &str, outcome: SyncOutcome) {
        self.slices_succeeded.insert(slice.to_string());
        self.outcomes.insert(slice.to_string(), outcome);
    }

    pub fn record_failure(&mut self, slice: &str, failure: SliceFailure) {
        self.slices_succeeded.remove(slice);
        self.outcomes.insert(slice.to_string(), SyncOutcome::Failed);
        self.failures.insert(slice.to_string(), failure);
    }

    pub fn succeeded_count(&self) -> usize {
        self.slices_succeeded.len()
    }

    pub fn failed_count(&self) -> usize {
        self.failures.len()
    }

    /// True if any slice failed because credentials were rejected.
    pub fn auth_failed(&self) -> bool {
        self.failures
            .values()
            .any(|f| f.kind == FailureKind::AuthFailure)
    }

    /// True if every attempted slice finished as a no-op.
    pub fn is_noop(&self) -> bool {
        self.failures.is_empty()
            && self.conflicts.is_empty()
            && self.outcomes.values().all(|o| *o == SyncOutcome::NoOp)
    }

    /// Condensed view for user-facing notices.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            at: self.finished_at.unwrap_or(self.started_at),
            succeeded: self.succeeded_count(),
            failed: self.failed_count(),
            conflicts: self.conflicts.len(),
            failure_reasons: self
                .failures
                .iter()
                .map(|(slice, f)| format!("{}: {}", slice, f.message))
                .collect(),
            auth_required: self.auth_failed(),
        }
    }
}

/// What a toast notice needs to know about a finished pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub at: Timestamp,
    pub succeeded: usize,
    pub failed: usize,
    pub conflicts: usize,
    pub failure_reasons: Vec<String>,
    /// Credentials must be refreshed before syncing resumes
    pub auth_required: bool,
}
