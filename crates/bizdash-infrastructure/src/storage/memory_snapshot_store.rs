//! In-memory snapshot store.
//!
//! Keeps the encoded bytes rather than the snapshot value, so corruption and
//! save failures can be staged exactly as the file store would see them.

use bizdash_core::{BizdashError, Result, SnapshotStore, StateSnapshot};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use super::codec::{decode_snapshot, encode_snapshot};

#[derive(Debug, Default)]
struct Slots {
    latest: Option<Vec<u8>>,
    audit: VecDeque<(u64, Vec<u8>)>,
}

/// Volatile snapshot store for tests and ephemeral sessions.
#[derive(Debug)]
pub struct MemorySnapshotStore {
    slots: Mutex<Slots>,
    audit_depth: usize,
    fail_saves: AtomicBool,
}

impl MemorySnapshotStore {
    pub fn new(audit_depth: usize) -> Self {
        Self {
            slots: Mutex::new(Slots::default()),
            audit_depth,
            fail_saves: AtomicBool::new(false),
        }
    }

    /// Makes every following `save` fail until reset.
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    /// Overwrites the latest slot with arbitrary bytes.
    pub fn put_raw(&self, bytes: impl Into<Vec<u8>>) {
        if let Ok(mut slots) = self.slots.lock() {
            slots.latest = Some(bytes.into());
        }
    }

    /// Returns the bytes currently held in the latest slot.
    pub fn raw(&self) -> Option<Vec<u8>> {
        self.slots.lock().ok().and_then(|slots| slots.latest.clone())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Slots>> {
        self.slots
            .lock()
            .map_err(|e| BizdashError::PersistenceUnavailable(format!("store poisoned: {}", e)))
    }
}

impl Default for MemorySnapshotStore {
    fn default() -> Self {
        Self::new(10)
    }
}

impl SnapshotStore for MemorySnapshotStore {
    fn save(&self, snapshot: &StateSnapshot) -> Result<()> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(BizdashError::PersistenceUnavailable(
                "simulated write failure".to_string(),
            ));
        }
        let bytes = encode_snapshot(snapshot)?;
        let mut slots = self.lock()?;
        slots.latest = Some(bytes.clone());
        if self.audit_depth > 0 {
            slots.audit.push_back((snapshot.snapshot_version, bytes));
            while slots.audit.len() > self.audit_depth {
                slots.audit.pop_front();
            }
        }
        Ok(())
    }

    fn load(&self) -> Result<StateSnapshot> {
        let slots = self.lock()?;
        let bytes = slots
            .latest
            .as_ref()
            .ok_or_else(|| BizdashError::not_found("Snapshot", "latest"))?;
        decode_snapshot(bytes)
    }

    fn audit_versions(&self) -> Result<Vec<u64>> {
        Ok(self.lock()?.audit.iter().map(|(v, _)| *v).collect())
    }

    fn load_audit(&self, version: u64) -> Result<StateSnapshot> {
        let slots = self.lock()?;
        let (_, bytes) = slots
            .audit
            .iter()
            .find(|(v, _)| *v == version)
            .ok_or_else(|| BizdashError::not_found("AuditSnapshot", version.to_string()))?;
        decode_snapshot(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bizdash_core::Slice;

    #[test]
    fn test_round_trip() {
        let store = MemorySnapshotStore::default();
        let snapshot = StateSnapshot::empty().with_slice(Slice::new("hr", 1));
        store.save(&snapshot).unwrap();
        assert_eq!(store.load().unwrap(), snapshot);
    }

    #[test]
    fn test_failed_save_keeps_previous() {
        let store = MemorySnapshotStore::default();
        let first = StateSnapshot::empty().with_slice(Slice::new("hr", 1));
        store.save(&first).unwrap();

        store.set_fail_saves(true);
        let second = first.with_slice(Slice::new("okrs", 1));
        assert!(store.save(&second).is_err());

        assert_eq!(store.load().unwrap(), first);
    }

    #[test]
    fn test_raw_corruption() {
        let store = MemorySnapshotStore::default();
        store.put_raw(b"nope".to_vec());
        assert!(store.load().unwrap_err().is_corrupt());
        assert_eq!(store.raw().unwrap(), b"nope");
    }
}
