//! The central state store.
//!
//! `StateStore` is the single source of truth for all slices. Every
//! mutation takes a turn on one FIFO queue and runs to completion
//! (validate, build the next snapshot, persist, publish, notify) before the
//! next one starts. Readers get immutable `Arc` views and never wait on the
//! queue.

mod bus;

pub use bus::{SliceListener, SubscriberBus, SubscriptionHandle};

use bizdash_core::config::DashboardConfig;
use bizdash_core::{
    BizdashError, Clock, EditCommand, Fields, Result, Slice, SliceSyncSummary, SnapshotStore,
    StateSnapshot, SyncPatch, Timestamp,
};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Unreadable snapshot bytes found by `load()`, kept for diagnostics.
#[derive(Debug, Clone, PartialEq)]
pub struct CorruptSnapshot {
    pub raw: Vec<u8>,
    pub reason: String,
    pub detected_at: Timestamp,
}

/// What `load()` found in persistence.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadReport {
    /// Nothing was ever saved
    Fresh,
    /// The latest snapshot was restored
    Restored { snapshot_version: u64 },
    /// The stored snapshot failed validation; started empty
    Corrupt { reason: String },
    /// The storage medium could not be read; started empty
    Unavailable { message: String },
}

impl LoadReport {
    /// True if local data was lost and every slice must be pulled again.
    pub fn needs_resync(&self) -> bool {
        matches!(self, Self::Corrupt { .. } | Self::Unavailable { .. })
    }
}

pub struct StateStore {
    /// Ordering queue; held for the whole of each mutation
    queue: Mutex<()>,
    current: RwLock<Arc<StateSnapshot>>,
    corrupt: RwLock<Option<Arc<CorruptSnapshot>>>,
    bus: Arc<SubscriberBus>,
    persistence: Arc<dyn SnapshotStore>,
    clock: Arc<dyn Clock>,
    registered: Vec<String>,
    schema_version: u32,
}

impl StateStore {
    pub fn new(persistence: Arc<dyn SnapshotStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            queue: Mutex::new(()),
            current: RwLock::new(Arc::new(StateSnapshot::empty())),
            corrupt: RwLock::new(None),
            bus: SubscriberBus::new(),
            persistence,
            clock,
            registered: Vec::new(),
            schema_version: 1,
        }
    }

    /// Slices to create on `load()` if persistence does not have them.
    pub fn with_slices<I, S>(mut self, names: I, schema_version: u32) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.registered = names.into_iter().map(Into::into).collect();
        self.schema_version = schema_version;
        self
    }

    pub fn from_config(
        config: &DashboardConfig,
        persistence: Arc<dyn SnapshotStore>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self::new(persistence, clock).with_slices(config.slices.clone(), config.schema_version)
    }

    // ============================================================================
    // Reads
    // ============================================================================

    /// Current snapshot.
    pub fn snapshot(&self) -> Arc<StateSnapshot> {
        self.current
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    pub fn snapshot_version(&self) -> u64 {
        self.snapshot().snapshot_version
    }

    pub fn get_slice(&self, name: &str) -> Result<Arc<Slice>> {
        self.snapshot()
            .slice(name)
            .cloned()
            .ok_or_else(|| BizdashError::slice_not_found(name))
    }

    pub fn slice_names(&self) -> Vec<String> {
        self.snapshot().slice_names()
    }

    /// Bytes that failed validation during the last `load()`, if any.
    pub fn corrupt_snapshot(&self) -> Option<Arc<CorruptSnapshot>> {
        self.corrupt
            .read()
            .unwrap_or_else(|p| p.into_inner())
            .clone()
    }

    /// Registers `callback` for committed changes of `slice`.
    ///
    /// Callbacks run synchronously inside the commit, in registration order,
    /// once per committed mutation that changes the slice.
    pub fn subscribe<F>(&self, slice: &str, callback: F) -> SubscriptionHandle
    where
        F: Fn(&Arc<Slice>) + Send + Sync + 'static,
    {
        self.bus.subscribe(slice, Arc::new(callback))
    }

    // ============================================================================
    // Lifecycle
    // ============================================================================

    /// Restores the latest snapshot from persistence.
    ///
    /// Unreadable data never fails the load: the store starts empty, every
    /// registered slice is flagged for a full resync, and corrupt bytes stay
    /// available through [`StateStore::corrupt_snapshot`]. Registered slices
    /// missing from the snapshot are created in one commit.
    pub async fn load(&self) -> Result<LoadReport> {
        let _turn = self.queue.lock().await;

        let (loaded, report) = match self.persistence.load() {
            Ok(snapshot) => {
                let version = snapshot.snapshot_version;
                tracing::info!(
                    "[StateStore] Restored snapshot version {} ({} slices)",
                    version,
                    snapshot.slices.len()
                );
                (snapshot, LoadReport::Restored { snapshot_version: version })
            }
            Err(e) if e.is_not_found() => {
                tracing::info!("[StateStore] No saved snapshot, starting empty");
                (StateSnapshot::empty(), LoadReport::Fresh)
            }
            Err(BizdashError::Corrupt { reason, raw }) => {
                tracing::warn!(
                    "[StateStore] Saved snapshot is corrupt ({}), starting empty and resyncing",
                    reason
                );
                let detected_at = self.clock.now();
                *self.corrupt.write().unwrap_or_else(|p| p.into_inner()) =
                    Some(Arc::new(CorruptSnapshot {
                        raw,
                        reason: reason.clone(),
                        detected_at,
                    }));
                (self.fallback_snapshot(), LoadReport::Corrupt { reason })
            }
            Err(e) => {
                tracing::warn!(
                    "[StateStore] Persistence unavailable ({}), starting empty and resyncing",
                    e
                );
                (
                    self.fallback_snapshot(),
                    LoadReport::Unavailable {
                        message: e.to_string(),
                    },
                )
            }
        };

        let previous = self.snapshot();
        let loaded = Arc::new(loaded);
        self.publish(loaded.clone());
        for (name, slice) in &loaded.slices {
            if previous.slice(name) != Some(slice) {
                self.bus.publish(slice);
            }
        }

        let missing: Vec<Slice> = self
            .registered
            .iter()
            .filter(|name| loaded.slice(name).is_none())
            .map(|name| {
                let mut slice = Slice::new(name.clone(), self.schema_version);
                slice.needs_resync = report.needs_resync();
                slice
            })
            .collect();
        if !missing.is_empty() {
            self.commit(&loaded, missing)?;
        }

        Ok(report)
    }

    /// Empty snapshot numbered after the newest audit entry, so versions
    /// keep increasing across a recovery.
    fn fallback_snapshot(&self) -> StateSnapshot {
        let mut snapshot = StateSnapshot::empty();
        snapshot.snapshot_version = self
            .persistence
            .audit_versions()
            .ok()
            .and_then(|versions| versions.last().copied())
            .unwrap_or(0);
        snapshot
    }

    // ============================================================================
    // Mutations
    // ============================================================================

    /// Creates an empty slice; returns the existing one if already registered.
    pub async fn register_slice(&self, name: &str, schema_version: u32) -> Result<Arc<Slice>> {
        if name.trim().is_empty() {
            return Err(BizdashError::config("slice name must not be empty"));
        }
        self.mutate(name, |snapshot| {
            if snapshot.slice(name).is_some() {
                return Ok(None);
            }
            tracing::info!("[StateStore] Registering slice '{}'", name);
            Ok(Some(Slice::new(name, schema_version)))
        })
        .await
    }

    /// Applies field patches to one record.
    ///
    /// Fails with `NotFound` for an unknown slice, `UnknownRecord` for an
    /// unknown record and `CommitFailed` if the result cannot be persisted;
    /// in every failure case the store is left unchanged.
    pub async fn apply_edit_command(&self, cmd: EditCommand) -> Result<Arc<Slice>> {
        self.mutate(&cmd.slice_name, |snapshot| {
            let slice = snapshot
                .slice(&cmd.slice_name)
                .ok_or_else(|| BizdashError::slice_not_found(&cmd.slice_name))?;
            if slice.record(&cmd.record_key).is_none() {
                return Err(BizdashError::unknown_record(&cmd.slice_name, &cmd.record_key));
            }
            if cmd.field_patches.is_empty() {
                return Ok(None);
            }
            let mut next = (**slice).clone();
            let now = self.clock.now();
            next.apply_patches(&cmd.record_key, &cmd.field_patches, cmd.originated_at, now)?;
            Ok(Some(next))
        })
        .await
    }

    /// Appends a locally created record.
    pub async fn insert_record(&self, slice_name: &str, key: &str, fields: Fields) -> Result<Arc<Slice>> {
        let at = self.clock.now();
        self.mutate(slice_name, |snapshot| {
            let mut next = (**Self::existing(snapshot, slice_name)?).clone();
            next.insert_record(key, fields, at)?;
            Ok(Some(next))
        })
        .await
    }

    /// Removes a record; the delete is pushed on the next sync.
    pub async fn delete_record(&self, slice_name: &str, key: &str) -> Result<Arc<Slice>> {
        let at = self.clock.now();
        self.mutate(slice_name, |snapshot| {
            let mut next = (**Self::existing(snapshot, slice_name)?).clone();
            next.delete_record(key, at)?;
            Ok(Some(next))
        })
        .await
    }

    /// Accepts reconciled remote rows for one slice. Used by the sync engine.
    pub async fn apply_sync_patch(&self, slice_name: &str, patch: SyncPatch) -> Result<Arc<Slice>> {
        self.mutate(slice_name, |snapshot| {
            let current = Self::existing(snapshot, slice_name)?;
            Ok(Some(current.absorb_remote(&patch)))
        })
        .await
    }

    /// Records a failed sync step in slice metadata, leaving data untouched.
    pub async fn record_sync_failure(
        &self,
        slice_name: &str,
        summary: SliceSyncSummary,
    ) -> Result<Arc<Slice>> {
        self.mutate(slice_name, |snapshot| {
            let mut next = (**Self::existing(snapshot, slice_name)?).clone();
            next.last_sync = Some(summary);
            Ok(Some(next))
        })
        .await
    }

    /// Commits the slices of audit entry `version` as a new snapshot version.
    ///
    /// Slices absent from the audit entry are kept as they are.
    pub async fn restore_from_audit(&self, version: u64) -> Result<u64> {
        let _turn = self.queue.lock().await;
        let audit = self.persistence.load_audit(version)?;
        let current = self.snapshot();

        let changed: Vec<Slice> = audit
            .slices
            .values()
            .filter(|slice| current.slice(&slice.name) != Some(*slice))
            .map(|slice| (**slice).clone())
            .collect();
        if changed.is_empty() {
            return Ok(current.snapshot_version);
        }

        let next = self.commit(&current, changed)?;
        tracing::info!(
            "[StateStore] Restored audit version {} as snapshot version {}",
            version,
            next.snapshot_version
        );
        Ok(next.snapshot_version)
    }

    fn existing<'a>(snapshot: &'a StateSnapshot, name: &str) -> Result<&'a Arc<Slice>> {
        snapshot
            .slice(name)
            .ok_or_else(|| BizdashError::slice_not_found(name))
    }

    /// Runs one single-slice mutation on the queue.
    ///
    /// `build` returns `None` when there is nothing to change; the current
    /// slice is returned and no version is spent.
    async fn mutate<F>(&self, slice_name: &str, build: F) -> Result<Arc<Slice>>
    where
        F: FnOnce(&StateSnapshot) -> Result<Option<Slice>>,
    {
        let _turn = self.queue.lock().await;
        let current = self.snapshot();

        match build(&current)? {
            Some(slice) => {
                let next = self.commit(&current, vec![slice])?;
                Self::existing(&next, slice_name).cloned()
            }
            None => Self::existing(&current, slice_name).cloned(),
        }
    }

    /// Persists and publishes the next snapshot, then notifies subscribers.
    ///
    /// Must be called while holding the queue. On a failed save nothing is
    /// published, which leaves the in-memory state as it was.
    fn commit(&self, current: &StateSnapshot, changed: Vec<Slice>) -> Result<Arc<StateSnapshot>> {
        for slice in &changed {
            slice.validate().map_err(BizdashError::internal)?;
        }

        let mut next = current.clone();
        let names: Vec<String> = changed.iter().map(|s| s.name.clone()).collect();
        for slice in changed {
            next.slices.insert(slice.name.clone(), Arc::new(slice));
        }
        next.snapshot_version = current.snapshot_version + 1;
        next.saved_at = Some(self.clock.now());

        if let Err(e) = self.persistence.save(&next) {
            tracing::error!(
                "[StateStore] Commit of version {} failed, rolled back: {}",
                next.snapshot_version,
                e
            );
            return Err(BizdashError::CommitFailed(e.to_string()));
        }

        tracing::debug!(
            "[StateStore] Committed version {} ({})",
            next.snapshot_version,
            names.join(", ")
        );

        let next = Arc::new(next);
        self.publish(next.clone());
        for name in &names {
            if let Some(slice) = next.slice(name) {
                self.bus.publish(slice);
            }
        }
        Ok(next)
    }

    fn publish(&self, snapshot: Arc<StateSnapshot>) {
        *self.current.write().unwrap_or_else(|p| p.into_inner()) = snapshot;
    }
}
