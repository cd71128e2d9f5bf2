//! SyncEngine - bidirectional synchronization between the state store and
//! the external sheet service.
//!
//! One pass walks the registered slices in order. Per slice:
//!
//! 1. fetch remote rows and revision
//! 2. unchanged revision and clean slice: no-op, nothing is written
//! 3. otherwise reconcile field by field ([`crate::conflict::reconcile`])
//! 4. push the agreed rows if the remote does not hold them yet
//! 5. hand the agreed rows to the store as a [`SyncPatch`]
//!
//! A failing slice is recorded and skipped; the pass carries on with the
//! next one and never returns an error. An authentication failure is the
//! exception: it ends the pass and blocks further passes until
//! [`SyncEngine::refresh_credentials`] is called.

use bizdash_core::{
    BizdashError, Clock, ConflictRecord, FailureKind, Result, SheetService, SliceFailure,
    SliceSyncSummary, SyncOutcome, SyncPatch, SyncSession,
};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::conflict::{reconcile, remote_moved};
use crate::store::StateStore;

struct SliceStep {
    outcome: SyncOutcome,
    conflicts: Vec<ConflictRecord>,
}

pub struct SyncEngine {
    store: Arc<StateStore>,
    sheet: Arc<dyn SheetService>,
    clock: Arc<dyn Clock>,
    /// Serializes passes
    pass_lock: Mutex<()>,
    /// Set after an authentication failure
    auth_block: StdMutex<Option<String>>,
}

impl SyncEngine {
    pub fn new(store: Arc<StateStore>, sheet: Arc<dyn SheetService>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            sheet,
            clock,
            pass_lock: Mutex::new(()),
            auth_block: StdMutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// True while passes are refused because credentials were rejected.
    pub fn is_auth_blocked(&self) -> bool {
        self.auth_block
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .is_some()
    }

    /// Lifts the block set by an authentication failure.
    pub fn refresh_credentials(&self) {
        let previous = self
            .auth_block
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .take();
        if previous.is_some() {
            tracing::info!("[SyncEngine] Credentials refreshed, sync resumes");
        }
    }

    /// Runs one pass over every registered slice.
    pub async fn run_pass(&self) -> SyncSession {
        self.run_pass_cancellable(&CancellationToken::new()).await
    }

    /// Runs one pass, stopping before the next slice once `cancel` fires.
    pub async fn run_pass_cancellable(&self, cancel: &CancellationToken) -> SyncSession {
        let names = self.store.slice_names();
        self.sync_slices(&names, cancel).await
    }

    /// Runs one pass over the given slices, in order.
    pub async fn sync_slices(&self, names: &[String], cancel: &CancellationToken) -> SyncSession {
        let _pass = self.pass_lock.lock().await;
        let mut session = SyncSession::new(self.clock.now());

        tracing::debug!(
            "[SyncEngine] Pass {} started for {} slices",
            session.id,
            names.len()
        );

        let blocked = self
            .auth_block
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .clone();
        if let Some(reason) = blocked {
            tracing::warn!(
                "[SyncEngine] Pass {} skipped: credentials must be refreshed",
                session.id
            );
            for name in names {
                session.slices_attempted.insert(name.clone());
                session.record_failure(
                    name,
                    SliceFailure {
                        kind: FailureKind::AuthFailure,
                        message: reason.clone(),
                        retryable: false,
                    },
                );
            }
            session.finished_at = Some(self.clock.now());
            return session;
        }

        for (index, name) in names.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(
                    "[SyncEngine] Pass {} cancelled before '{}'",
                    session.id,
                    name
                );
                session.cancelled = true;
                break;
            }

            session.slices_attempted.insert(name.clone());
            match self.sync_slice(name).await {
                Ok(step) => {
                    for conflict in &step.conflicts {
                        tracing::info!(
                            "[SyncEngine] Conflict on {}/{}.{} resolved as {:?}: local={:?} remote={:?}",
                            conflict.slice_name,
                            conflict.record_key,
                            conflict.field,
                            conflict.resolution,
                            conflict.local_value,
                            conflict.remote_value
                        );
                    }
                    session.conflicts.extend(step.conflicts);
                    session.record_success(name, step.outcome);
                }
                Err(err) => {
                    self.record_failure(&mut session, name, &err).await;
                    if err.is_auth_failure() {
                        self.block(&err);
                        for rest in &names[index + 1..] {
                            session.slices_attempted.insert(rest.clone());
                            session.record_failure(rest, SliceFailure::from(&err));
                        }
                        break;
                    }
                }
            }
        }

        session.finished_at = Some(self.clock.now());
        let summary = session.summary();
        if session.is_noop() {
            tracing::debug!("[SyncEngine] Pass {} finished: nothing to do", session.id);
        } else {
            tracing::info!(
                "[SyncEngine] Pass {} finished: {} succeeded, {} failed, {} conflicts",
                session.id,
                summary.succeeded,
                summary.failed,
                summary.conflicts
            );
        }
        session
    }

    async fn sync_slice(&self, name: &str) -> Result<SliceStep> {
        let local = self.store.get_slice(name)?;
        let remote = self.sheet.fetch_slice(name).await?;

        let remote_moved = remote_moved(&local, &remote);
        if !remote_moved && !local.dirty {
            tracing::debug!("[SyncEngine] '{}' unchanged on both sides", name);
            return Ok(SliceStep {
                outcome: SyncOutcome::NoOp,
                conflicts: Vec::new(),
            });
        }

        let reconciled = reconcile(&local, &remote);
        let revision = if reconciled.push_needed {
            self.sheet.push_slice(name, &reconciled.rows).await?
        } else {
            remote.revision.clone()
        };

        let outcome = if !reconciled.conflicts.is_empty()
            || (reconciled.push_needed && reconciled.local_changed)
        {
            SyncOutcome::Merged
        } else if reconciled.push_needed {
            SyncOutcome::Pushed
        } else if reconciled.local_changed || remote_moved {
            SyncOutcome::Pulled
        } else {
            SyncOutcome::NoOp
        };

        let patch = SyncPatch {
            rows: reconciled.rows,
            revision,
            base: local,
            summary: SliceSyncSummary {
                at: self.clock.now(),
                outcome,
                conflicts: reconciled.conflicts.len(),
                error: None,
            },
        };
        self.store.apply_sync_patch(name, patch).await?;

        tracing::info!("[SyncEngine] '{}' synced: {:?}", name, outcome);
        Ok(SliceStep {
            outcome,
            conflicts: reconciled.conflicts,
        })
    }

    async fn record_failure(&self, session: &mut SyncSession, name: &str, err: &BizdashError) {
        let failure = SliceFailure::from(err);
        if failure.retryable {
            tracing::warn!("[SyncEngine] '{}' failed, retrying next pass: {}", name, err);
        } else {
            tracing::warn!("[SyncEngine] '{}' failed: {}", name, err);
        }
        session.record_failure(name, failure);

        let summary = SliceSyncSummary {
            at: self.clock.now(),
            outcome: SyncOutcome::Failed,
            conflicts: 0,
            error: Some(err.to_string()),
        };
        if let Err(e) = self.store.record_sync_failure(name, summary).await {
            tracing::warn!(
                "[SyncEngine] Could not record failure for '{}': {}",
                name,
                e
            );
        }
    }

    fn block(&self, err: &BizdashError) {
        tracing::warn!(
            "[SyncEngine] Sync blocked until credentials are refreshed: {}",
            err
        );
        *self.auth_block.lock().unwrap_or_else(|p| p.into_inner()) = Some(err.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bizdash_core::clock::timestamp_secs;
    use bizdash_core::{EditCommand, Fields, ManualClock, RemoteRow, RemoteSlice};
    use bizdash_infrastructure::{InMemorySheetService, InjectedFailure, MemorySnapshotStore};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Harness {
        clock: Arc<ManualClock>,
        sheet: Arc<InMemorySheetService>,
        store: Arc<StateStore>,
        engine: SyncEngine,
    }

    async fn harness(slices: &[&str]) -> Harness {
        let clock = Arc::new(ManualClock::at_secs(100));
        let sheet = Arc::new(InMemorySheetService::with_clock(clock.clone()));
        let store = Arc::new(
            StateStore::new(Arc::new(MemorySnapshotStore::new(5)), clock.clone())
                .with_slices(slices.iter().copied(), 1),
        );
        store.load().await.unwrap();
        let engine = SyncEngine::new(store.clone(), sheet.clone(), clock.clone());
        Harness {
            clock,
            sheet,
            store,
            engine,
        }
    }

    fn amount(value: i64) -> Fields {
        let mut fields = Fields::new();
        fields.insert("amount".to_string(), json!(value));
        fields
    }

    #[tokio::test]
    async fn test_first_pass_pulls() {
        let h = harness(&["revenue"]).await;
        h.sheet.put_record("revenue", "q1", amount(10), timestamp_secs(50));

        let session = h.engine.run_pass().await;

        assert_eq!(session.outcomes["revenue"], SyncOutcome::Pulled);
        let slice = h.store.get_slice("revenue").unwrap();
        assert_eq!(slice.rows.len(), 1);
        assert!(!slice.dirty);
        assert_eq!(slice.remote_revision.as_deref(), Some("rev-1"));
    }

    #[tokio::test]
    async fn test_noop_pass_writes_nothing() {
        let h = harness(&["revenue"]).await;
        h.sheet.put_record("revenue", "q1", amount(10), timestamp_secs(50));
        h.engine.run_pass().await;
        let version = h.store.snapshot_version();

        let session = h.engine.run_pass().await;

        assert!(session.is_noop());
        assert_eq!(h.store.snapshot_version(), version);
        assert_eq!(h.sheet.push_count(), 0);
    }

    #[tokio::test]
    async fn test_local_edit_is_pushed() {
        let h = harness(&["expenses"]).await;
        h.sheet.put_record("expenses", "R", amount(100), timestamp_secs(50));
        h.engine.run_pass().await;

        h.clock.set_secs(200);
        let cmd = EditCommand::new("expenses", "R", timestamp_secs(200)).set("amount", 150);
        h.store.apply_edit_command(cmd).await.unwrap();

        let session = h.engine.run_pass().await;

        assert_eq!(session.outcomes["expenses"], SyncOutcome::Pushed);
        assert_eq!(h.sheet.rows("expenses")[0].fields["amount"], json!(150));
        let slice = h.store.get_slice("expenses").unwrap();
        assert!(!slice.dirty);
        assert_eq!(slice.remote_revision.as_deref(), Some("rev-2"));
    }

    #[tokio::test]
    async fn test_push_keeps_edit_despite_remote_clock_skew() {
        let h = harness(&["expenses"]).await;
        h.sheet.put_record("expenses", "R", amount(100), timestamp_secs(500));
        h.engine.run_pass().await;
        let revision = h.sheet.revision("expenses");

        h.clock.set_secs(200);
        let cmd = EditCommand::new("expenses", "R", timestamp_secs(200)).set("amount", 150);
        h.store.apply_edit_command(cmd).await.unwrap();
        assert_eq!(h.sheet.revision("expenses"), revision);

        let session = h.engine.run_pass().await;

        assert_eq!(session.outcomes["expenses"], SyncOutcome::Pushed);
        assert!(session.conflicts.is_empty());
        assert_eq!(h.sheet.rows("expenses")[0].fields["amount"], json!(150));
        let slice = h.store.get_slice("expenses").unwrap();
        assert_eq!(slice.record("R").unwrap().fields["amount"], json!(150));
        assert!(!slice.dirty);
    }

    #[tokio::test]
    async fn test_local_delete_is_pushed() {
        let h = harness(&["hr"]).await;
        h.sheet.put_record("hr", "e1", amount(1), timestamp_secs(50));
        h.sheet.put_record("hr", "e2", amount(2), timestamp_secs(50));
        h.engine.run_pass().await;

        h.store.delete_record("hr", "e1").await.unwrap();
        h.engine.run_pass().await;

        let keys: Vec<_> = h.sheet.rows("hr").into_iter().map(|r| r.key).collect();
        assert_eq!(keys, vec!["e2"]);
        assert!(!h.store.get_slice("hr").unwrap().is_locally_deleted("e1"));
    }

    #[tokio::test]
    async fn test_failure_is_recorded_and_dirty_kept() {
        let h = harness(&["okrs"]).await;
        h.sheet.put_record("okrs", "o1", amount(1), timestamp_secs(50));
        h.engine.run_pass().await;
        let cmd = EditCommand::new("okrs", "o1", timestamp_secs(120)).set("amount", 2);
        h.store.apply_edit_command(cmd).await.unwrap();

        h.sheet.inject_failure("okrs", InjectedFailure::Unavailable);
        let session = h.engine.run_pass().await;

        assert_eq!(session.failed_count(), 1);
        assert!(session.failures["okrs"].retryable);
        let slice = h.store.get_slice("okrs").unwrap();
        assert!(slice.dirty);
        let last = slice.last_sync.clone().unwrap();
        assert_eq!(last.outcome, SyncOutcome::Failed);
        assert!(last.error.is_some());

        h.sheet.clear_failure("okrs");
        let retry = h.engine.run_pass().await;
        assert_eq!(retry.outcomes["okrs"], SyncOutcome::Pushed);
        assert!(!h.store.get_slice("okrs").unwrap().dirty);
    }

    #[tokio::test]
    async fn test_auth_failure_blocks_until_refreshed() {
        let h = harness(&["expenses", "hr", "revenue"]).await;
        h.sheet.inject_failure("hr", InjectedFailure::Unauthorized);

        let session = h.engine.run_pass().await;

        assert!(session.auth_failed());
        assert_eq!(session.succeeded_count(), 1);
        assert_eq!(session.failed_count(), 2);
        assert!(h.engine.is_auth_blocked());

        let fetches = h.sheet.fetch_count();
        let blocked = h.engine.run_pass().await;
        assert_eq!(blocked.failed_count(), 3);
        assert_eq!(h.sheet.fetch_count(), fetches);

        h.sheet.clear_failure("hr");
        h.engine.refresh_credentials();
        let resumed = h.engine.run_pass().await;
        assert_eq!(resumed.failed_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_pass_stops_between_slices() {
        let h = harness(&["expenses", "hr"]).await;
        let cancel = CancellationToken::new();
        cancel.cancel();

        let session = h.engine.run_pass_cancellable(&cancel).await;

        assert!(session.cancelled);
        assert!(session.slices_attempted.is_empty());
        assert_eq!(h.sheet.fetch_count(), 0);
    }

    /// Sheet service that stalls on fetch and records an edit landing mid-step.
    struct EditDuringFetch {
        inner: InMemorySheetService,
        store: StdMutex<Option<Arc<StateStore>>>,
        fetches: AtomicUsize,
    }

    #[async_trait]
    impl SheetService for EditDuringFetch {
        async fn fetch_slice(&self, name: &str) -> Result<RemoteSlice> {
            if self.fetches.fetch_add(1, Ordering::SeqCst) == 1 {
                let store = self.store.lock().unwrap().clone();
                if let Some(store) = store {
                    let cmd =
                        EditCommand::new(name, "R", timestamp_secs(300)).set("amount", 777);
                    store.apply_edit_command(cmd).await?;
                }
            }
            self.inner.fetch_slice(name).await
        }

        async fn push_slice(&self, name: &str, rows: &[RemoteRow]) -> Result<String> {
            self.inner.push_slice(name, rows).await
        }
    }

    #[tokio::test]
    async fn test_edit_during_step_survives() {
        let clock = Arc::new(ManualClock::at_secs(100));
        let sheet = Arc::new(EditDuringFetch {
            inner: InMemorySheetService::with_clock(clock.clone()),
            store: StdMutex::new(None),
            fetches: AtomicUsize::new(0),
        });
        sheet.inner.put_record("expenses", "R", amount(1), timestamp_secs(50));
        let store = Arc::new(
            StateStore::new(Arc::new(MemorySnapshotStore::new(5)), clock.clone())
                .with_slices(["expenses"], 1),
        );
        store.load().await.unwrap();
        let engine = SyncEngine::new(store.clone(), sheet.clone(), clock.clone());
        engine.run_pass().await;

        *sheet.store.lock().unwrap() = Some(store.clone());
        sheet.inner.put_record("expenses", "R", amount(2), timestamp_secs(150));
        engine.run_pass().await;

        let slice = store.get_slice("expenses").unwrap();
        assert_eq!(slice.record("R").unwrap().fields["amount"], json!(777));
        assert!(slice.dirty);

        engine.run_pass().await;
        assert_eq!(sheet.inner.rows("expenses")[0].fields["amount"], json!(777));
    }
}
