// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Liveness Monitor - per-subordinate deadline watchers
//!
//! One watcher task per registered subordinate waits for a liveness signal
//! (a heartbeat or a conditional poll) with a fixed deadline. A signal resets
//! the deadline; a missed deadline moves the watcher to its terminal
//! `Evicted` state and runs the owner's expiry callback exactly once.
//!
//! Watchers carry a generation number. The owner passes it back to
//! [`LivenessMonitor::retire`] from its expiry callback so that an eviction
//! racing with a fresh re-registration of the same id cannot remove the new
//! member.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer
//! - **Purpose:** Timeout-driven eviction shared by the root and relay tiers

use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::domain::error::TroopError;
use crate::domain::node::NodeId;

/// Observable state of one watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    /// Deadline running since registration, no signal yet.
    Waiting,
    /// Deadline last reset by a signal.
    Refreshed,
    /// Deadline missed; terminal for this watcher.
    Evicted,
}

struct Watcher {
    generation: u64,
    notify: Arc<Notify>,
    cancel: CancellationToken,
    state: Arc<Mutex<WatchState>>,
}

pub struct LivenessMonitor {
    deadline: Duration,
    watchers: Mutex<HashMap<NodeId, Watcher>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl LivenessMonitor {
    pub fn new(deadline: Duration, shutdown: CancellationToken) -> Self {
        Self {
            deadline,
            watchers: Mutex::new(HashMap::new()),
            next_generation: AtomicU64::new(1),
            shutdown,
        }
    }

    pub fn deadline(&self) -> Duration {
        self.deadline
    }

    /// Start a fresh watcher for `id`, replacing any previous one.
    ///
    /// `on_expire` receives the id and the watcher generation when the
    /// deadline elapses without a signal. Returns the generation.
    pub fn watch<F, Fut>(&self, id: NodeId, on_expire: F) -> u64
    where
        F: FnOnce(NodeId, u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let notify = Arc::new(Notify::new());
        let cancel = self.shutdown.child_token();
        let state = Arc::new(Mutex::new(WatchState::Waiting));

        let previous = self.watchers.lock().insert(
            id.clone(),
            Watcher {
                generation,
                notify: notify.clone(),
                cancel: cancel.clone(),
                state: state.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.cancel.cancel();
        }

        let deadline = self.deadline;
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        debug!(subordinate_id = %id, generation, "Liveness watcher stopped");
                        return;
                    }
                    _ = notify.notified() => {
                        *state.lock() = WatchState::Refreshed;
                    }
                    _ = tokio::time::sleep(deadline) => {
                        *state.lock() = WatchState::Evicted;
                        warn!(
                            subordinate_id = %id,
                            generation,
                            deadline_secs = deadline.as_secs(),
                            "Liveness deadline missed"
                        );
                        on_expire(id, generation).await;
                        return;
                    }
                }
            }
        });

        generation
    }

    /// Deliver a liveness signal for `id`.
    pub fn signal(&self, id: &NodeId) -> Result<(), TroopError> {
        let watchers = self.watchers.lock();
        match watchers.get(id) {
            Some(watcher) if *watcher.state.lock() != WatchState::Evicted => {
                // A stored permit covers a signal that lands between two waits.
                watcher.notify.notify_one();
                Ok(())
            }
            _ => Err(TroopError::UnknownSubordinate(id.to_string())),
        }
    }

    /// Remove the watcher for `id` if it is still generation `generation`.
    /// Returns whether it was removed.
    pub fn retire(&self, id: &NodeId, generation: u64) -> bool {
        let mut watchers = self.watchers.lock();
        match watchers.get(id) {
            Some(watcher) if watcher.generation == generation => {
                if let Some(watcher) = watchers.remove(id) {
                    watcher.cancel.cancel();
                }
                true
            }
            _ => false,
        }
    }

    /// Stop and drop the watcher for `id` regardless of generation.
    pub fn forget(&self, id: &NodeId) {
        if let Some(watcher) = self.watchers.lock().remove(id) {
            watcher.cancel.cancel();
        }
    }

    pub fn state(&self, id: &NodeId) -> Option<WatchState> {
        self.watchers.lock().get(id).map(|w| *w.state.lock())
    }

    pub fn watched(&self) -> usize {
        self.watchers.lock().len()
    }

    /// Cancel every watcher.
    pub fn shutdown(&self) {
        for (_, watcher) in self.watchers.lock().drain() {
            watcher.cancel.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn monitor(secs: u64) -> Arc<LivenessMonitor> {
        Arc::new(LivenessMonitor::new(Duration::from_secs(secs), CancellationToken::new()))
    }

    fn counting_expiry(
        monitor: &Arc<LivenessMonitor>,
        counter: &Arc<AtomicUsize>,
    ) -> impl FnOnce(NodeId, u64) -> std::pin::Pin<Box<dyn Future<Output = ()> + Send>> + Send + 'static {
        let monitor = monitor.clone();
        let counter = counter.clone();
        move |id, generation| {
            Box::pin(async move {
                if monitor.retire(&id, generation) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
            })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_missed_deadline_evicts_once() {
        let monitor = monitor(10);
        let evictions = Arc::new(AtomicUsize::new(0));
        let id = NodeId::new("r1");
        monitor.watch(id.clone(), counting_expiry(&monitor, &evictions));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
        assert_eq!(monitor.state(&id), None);
        assert!(matches!(monitor.signal(&id), Err(TroopError::UnknownSubordinate(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_signals_reset_deadline() {
        let monitor = monitor(10);
        let evictions = Arc::new(AtomicUsize::new(0));
        let id = NodeId::new("r1");
        monitor.watch(id.clone(), counting_expiry(&monitor, &evictions));

        for _ in 0..5 {
            tokio::time::sleep(Duration::from_secs(6)).await;
            monitor.signal(&id).unwrap();
        }
        tokio::task::yield_now().await;
        assert_eq!(evictions.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.state(&id), Some(WatchState::Refreshed));

        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(evictions.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_signal_unknown_id() {
        let monitor = monitor(10);
        let result = monitor.signal(&NodeId::new("ghost"));
        assert_eq!(result, Err(TroopError::UnknownSubordinate("ghost".to_string())));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_generation_cannot_retire_new_watcher() {
        let monitor = monitor(10);
        let id = NodeId::new("l1");
        let first = monitor.watch(id.clone(), |_, _| async {});
        let second = monitor.watch(id.clone(), |_, _| async {});
        assert_ne!(first, second);
        assert!(!monitor.retire(&id, first));
        assert_eq!(monitor.state(&id), Some(WatchState::Waiting));
        assert!(monitor.retire(&id, second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_forget_stops_watcher() {
        let monitor = monitor(10);
        let evictions = Arc::new(AtomicUsize::new(0));
        let id = NodeId::new("r1");
        monitor.watch(id.clone(), counting_expiry(&monitor, &evictions));
        monitor.forget(&id);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(evictions.load(Ordering::SeqCst), 0);
        assert_eq!(monitor.watched(), 0);
    }
}
