//! Application layer for Bizdash.
//!
//! Wires the domain model to its ports: the [`StateStore`] owns all slices,
//! the [`SyncEngine`] reconciles them with the external sheet service, and
//! the [`SyncScheduler`] runs sync passes in the background.

pub mod conflict;
pub mod scheduler;
pub mod store;
pub mod sync_engine;

pub use conflict::{Reconciliation, reconcile};
pub use scheduler::SyncScheduler;
pub use store::{CorruptSnapshot, LoadReport, SliceListener, StateStore, SubscriptionHandle};
pub use sync_engine::SyncEngine;
