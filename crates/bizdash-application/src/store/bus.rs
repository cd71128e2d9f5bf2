//! Per-slice subscriber bus.

use bizdash_core::Slice;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Callback invoked with the new slice value after a committed change.
pub type SliceListener = Arc<dyn Fn(&Arc<Slice>) + Send + Sync>;

struct Listener {
    id: u64,
    callback: SliceListener,
}

/// Topic per slice name, listeners kept in registration order.
#[derive(Default)]
pub struct SubscriberBus {
    topics: Mutex<HashMap<String, Vec<Listener>>>,
    next_id: AtomicU64,
}

impl SubscriberBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn topics(&self) -> MutexGuard<'_, HashMap<String, Vec<Listener>>> {
        self.topics.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub fn subscribe(self: &Arc<Self>, slice: &str, callback: SliceListener) -> SubscriptionHandle {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.topics()
            .entry(slice.to_string())
            .or_default()
            .push(Listener { id, callback });
        SubscriptionHandle {
            bus: Arc::downgrade(self),
            slice: slice.to_string(),
            id,
        }
    }

    fn unsubscribe(&self, slice: &str, id: u64) -> bool {
        let mut topics = self.topics();
        let Some(listeners) = topics.get_mut(slice) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|l| l.id != id);
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            topics.remove(slice);
        }
        removed
    }

    /// Calls every listener of the slice's topic in registration order.
    ///
    /// The topic lock is released before the calls, so a listener may
    /// subscribe or unsubscribe without deadlocking.
    pub fn publish(&self, slice: &Arc<Slice>) {
        let callbacks: Vec<SliceListener> = self
            .topics()
            .get(&slice.name)
            .map(|listeners| listeners.iter().map(|l| l.callback.clone()).collect())
            .unwrap_or_default();

        for callback in callbacks {
            callback(slice);
        }
    }

    pub fn listener_count(&self, slice: &str) -> usize {
        self.topics().get(slice).map_or(0, Vec::len)
    }
}

/// Handle returned by `subscribe`; the subscription stays active until
/// [`SubscriptionHandle::unsubscribe`] is called.
pub struct SubscriptionHandle {
    bus: Weak<SubscriberBus>,
    slice: String,
    id: u64,
}

impl SubscriptionHandle {
    pub fn slice_name(&self) -> &str {
        &self.slice
    }

    /// Removes the subscription. Returns false if it was already removed.
    pub fn unsubscribe(&self) -> bool {
        self.bus
            .upgrade()
            .is_some_and(|bus| bus.unsubscribe(&self.slice, self.id))
    }
}

impl std::fmt::Debug for SubscriptionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionHandle")
            .field("slice", &self.slice)
            .field("id", &self.id)
            .finish()
    }
}
