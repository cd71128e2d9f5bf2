//! # Sync Scheduler
//!
//! Runs [`SyncEngine`] passes in the background: once on start (unless
//! disabled with [`SyncScheduler::with_initial_pass`]), then every interval,
//! plus on demand via [`SyncScheduler::trigger`]. Stopping cancels the task
//! cooperatively; a pass in progress finishes its current slice and returns
//! early.
//!
//! The latest finished session is published on a `watch` channel, which is
//! what toast notices consume.

use bizdash_core::SyncSession;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::sync_engine::SyncEngine;

struct Running {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct SyncScheduler {
    engine: Arc<SyncEngine>,
    interval: Duration,
    initial_pass: bool,
    trigger: Arc<Notify>,
    latest: watch::Sender<Option<SyncSession>>,
    running: Mutex<Option<Running>>,
}

impl SyncScheduler {
    pub fn new(engine: Arc<SyncEngine>, interval: Duration) -> Self {
        let (latest, _) = watch::channel(None);
        Self {
            engine,
            interval: interval.max(Duration::from_secs(1)),
            initial_pass: true,
            trigger: Arc::new(Notify::new()),
            latest,
            running: Mutex::new(None),
        }
    }

    pub fn with_initial_pass(mut self, enabled: bool) -> Self {
        self.initial_pass = enabled;
        self
    }

    /// Spawns the background task. Returns false if it is already running.
    pub async fn start(&self) -> bool {
        let mut running = self.running.lock().await;
        if running.as_ref().is_some_and(|r| !r.handle.is_finished()) {
            return false;
        }

        let cancel = CancellationToken::new();
        let handle = tokio::spawn(Self::run(
            self.engine.clone(),
            self.interval,
            self.initial_pass,
            self.trigger.clone(),
            self.latest.clone(),
            cancel.clone(),
        ));
        *running = Some(Running { cancel, handle });

        tracing::info!(
            "[SyncScheduler] Started with interval {}s",
            self.interval.as_secs()
        );
        true
    }

    /// Requests a pass as soon as the current one (if any) has finished.
    pub fn trigger(&self) {
        self.trigger.notify_one();
    }

    /// Cancels the background task and waits for it to exit.
    pub async fn stop(&self) {
        let Some(running) = self.running.lock().await.take() else {
            return;
        };
        running.cancel.cancel();
        if let Err(e) = running.handle.await {
            tracing::warn!("[SyncScheduler] Task ended abnormally: {}", e);
        }
        tracing::info!("[SyncScheduler] Stopped");
    }

    pub async fn is_running(&self) -> bool {
        self.running
            .lock()
            .await
            .as_ref()
            .is_some_and(|r| !r.handle.is_finished())
    }

    /// Receiver for the most recent finished session.
    pub fn subscribe(&self) -> watch::Receiver<Option<SyncSession>> {
        self.latest.subscribe()
    }

    pub fn latest_session(&self) -> Option<SyncSession> {
        self.latest.borrow().clone()
    }

    async fn run(
        engine: Arc<SyncEngine>,
        period: Duration,
        initial_pass: bool,
        trigger: Arc<Notify>,
        latest: watch::Sender<Option<SyncSession>>,
        cancel: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        if !initial_pass {
            // first tick completes immediately
            ticker.tick().await;
        }

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = trigger.notified() => {}
            }

            let session = engine.run_pass_cancellable(&cancel).await;
            if session.auth_failed() {
                tracing::warn!(
                    "[SyncScheduler] Pass {} needs fresh credentials",
                    session.id
                );
            }
            latest.send_replace(Some(session));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::StateStore;
    use bizdash_core::clock::timestamp_secs;
    use bizdash_core::{Fields, ManualClock};
    use bizdash_infrastructure::{InMemorySheetService, MemorySnapshotStore};

    async fn scheduler(interval: Duration) -> (Arc<InMemorySheetService>, Arc<StateStore>, SyncScheduler) {
        let clock = Arc::new(ManualClock::at_secs(100));
        let sheet = Arc::new(InMemorySheetService::with_clock(clock.clone()));
        let store = Arc::new(
            StateStore::new(Arc::new(MemorySnapshotStore::new(3)), clock.clone())
                .with_slices(["marketing"], 1),
        );
        store.load().await.unwrap();
        let engine = Arc::new(SyncEngine::new(store.clone(), sheet.clone(), clock));
        (sheet, store, SyncScheduler::new(engine, interval))
    }

    #[tokio::test]
    async fn test_start_runs_initial_pass() {
        let (sheet, store, scheduler) = scheduler(Duration::from_secs(3600)).await;
        sheet.put_record("marketing", "m1", Fields::new(), timestamp_secs(10));
        let mut latest = scheduler.subscribe();

        assert!(scheduler.start().await);
        assert!(!scheduler.start().await);

        latest.changed().await.unwrap();
        let session = latest.borrow().clone().unwrap();
        assert_eq!(session.succeeded_count(), 1);
        assert!(store.get_slice("marketing").unwrap().record("m1").is_some());

        scheduler.stop().await;
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test]
    async fn test_trigger_runs_another_pass() {
        let (sheet, store, scheduler) = scheduler(Duration::from_secs(3600)).await;
        let mut latest = scheduler.subscribe();
        scheduler.start().await;
        latest.changed().await.unwrap();

        sheet.put_record("marketing", "m2", Fields::new(), timestamp_secs(20));
        scheduler.trigger();
        latest.changed().await.unwrap();

        assert!(store.get_slice("marketing").unwrap().record("m2").is_some());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_without_initial_pass_waits_for_trigger() {
        let (sheet, store, scheduler) = scheduler(Duration::from_secs(3600)).await;
        let scheduler = scheduler.with_initial_pass(false);
        sheet.put_record("marketing", "m1", Fields::new(), timestamp_secs(10));
        let mut latest = scheduler.subscribe();
        scheduler.start().await;

        tokio::task::yield_now().await;
        assert!(scheduler.latest_session().is_none());
        assert!(store.get_slice("marketing").unwrap().record("m1").is_none());

        scheduler.trigger();
        latest.changed().await.unwrap();
        assert!(store.get_slice("marketing").unwrap().record("m1").is_some());
        scheduler.stop().await;
    }

    #[tokio::test]
    async fn test_stop_without_start_is_noop() {
        let (_, _, scheduler) = scheduler(Duration::from_secs(1)).await;
        scheduler.stop().await;
        assert!(scheduler.latest_session().is_none());
    }
}
