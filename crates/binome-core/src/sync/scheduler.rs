//! Debounced, single-flight scheduling of sync cycles.
//!
//! Every [`SyncScheduler::schedule`] call bumps a generation counter and
//! starts a timer; a timer only runs a cycle if no newer call superseded it.
//! At most one cycle runs at a time: a timer that fires during a cycle
//! schedules another timer instead. A timer is pending while the newest
//! generation is above the last settled one.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::Notify;

use super::engine::SyncEngine;
use crate::gateway::RemoteTable;
use crate::store::KvStore;

/// Quiet period after the last local mutation before a cycle runs.
pub const DEFAULT_DEBOUNCE: Duration = Duration::from_secs(2);

type CycleFuture = Pin<Box<dyn Future<Output = ()> + Send>>;
type CycleFn = Box<dyn Fn() -> CycleFuture + Send + Sync>;

/// Handle to a debounced sync trigger. Clones share the same timer.
#[derive(Clone)]
pub struct SyncScheduler {
    inner: Arc<Inner>,
}

struct Inner {
    delay: Duration,
    run_cycle: CycleFn,
    generation: AtomicU64,
    /// Highest generation that fired or was cancelled
    settled: AtomicU64,
    in_progress: AtomicBool,
    cycles: AtomicUsize,
    idle: Notify,
}

impl SyncScheduler {
    pub fn new<F, Fut>(delay: Duration, run_cycle: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            inner: Arc::new(Inner {
                delay,
                run_cycle: Box::new(move || Box::pin(run_cycle())),
                generation: AtomicU64::new(0),
                settled: AtomicU64::new(0),
                in_progress: AtomicBool::new(false),
                cycles: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Scheduler whose cycles run `engine`. Cycle errors are already logged
    /// and published by the engine.
    pub fn for_engine<S, G>(engine: Arc<SyncEngine<S, G>>, delay: Duration) -> Self
    where
        S: KvStore + 'static,
        G: RemoteTable + 'static,
    {
        Self::new(delay, move || {
            let engine = Arc::clone(&engine);
            async move {
                let _ = engine.run_cycle().await;
            }
        })
    }

    pub fn delay(&self) -> Duration {
        self.inner.delay
    }

    /// (Re)start the debounce timer.
    ///
    /// Must be called from within a Tokio runtime; outside one the request
    /// is dropped with a warning.
    pub fn schedule(&self) {
        Inner::schedule(&self.inner);
    }

    /// Drop the pending timer, if any. A cycle already running is not
    /// interrupted.
    pub fn cancel(&self) {
        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.inner.settle(generation);
        if !self.is_in_progress() {
            self.inner.idle.notify_waiters();
        }
    }

    /// Whether a timer is waiting to fire.
    pub fn is_pending(&self) -> bool {
        self.inner.is_pending()
    }

    pub fn is_in_progress(&self) -> bool {
        self.inner.in_progress.load(Ordering::SeqCst)
    }

    /// Number of cycles completed so far.
    pub fn cycles_run(&self) -> usize {
        self.inner.cycles.load(Ordering::SeqCst)
    }

    /// Wait until no timer is pending and no cycle is running.
    pub async fn flush(&self) {
        loop {
            let notified = self.inner.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if !self.is_pending() && !self.is_in_progress() {
                return;
            }
            notified.await;
        }
    }
}

impl Inner {
    fn schedule(inner: &Arc<Self>) {
        let Ok(handle) = Handle::try_current() else {
            tracing::warn!("Sync requested outside of an async runtime; ignoring");
            return;
        };

        let generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let timer = tokio::time::sleep(inner.delay);
        let inner = Arc::clone(inner);

        handle.spawn(async move {
            timer.await;
            Self::fire(&inner, generation).await;
        });
    }

    async fn fire(inner: &Arc<Self>, generation: u64) {
        if inner.generation.load(Ordering::SeqCst) != generation {
            return;
        }

        if inner.in_progress.swap(true, Ordering::SeqCst) {
            tracing::debug!("Sync cycle still running; deferring");
            Self::schedule(inner);
            return;
        }
        inner.settle(generation);

        let guard = InProgressGuard(inner);
        (inner.run_cycle)().await;
        drop(guard);
        inner.cycles.fetch_add(1, Ordering::SeqCst);

        if !inner.is_pending() {
            inner.idle.notify_waiters();
        }
    }

    /// Mark every timer up to `generation` as done. Timers armed later stay
    /// pending.
    fn settle(&self, generation: u64) {
        self.settled.fetch_max(generation, Ordering::SeqCst);
    }

    fn is_pending(&self) -> bool {
        self.generation.load(Ordering::SeqCst) > self.settled.load(Ordering::SeqCst)
    }
}

/// Clears the in-flight flag even if the cycle future panics.
struct InProgressGuard<'a>(&'a Inner);

impl Drop for InProgressGuard<'_> {
    fn drop(&mut self) {
        self.0.in_progress.store(false, Ordering::SeqCst);
    }
}
