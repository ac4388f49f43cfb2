//! # Shared timer pool for deferred engine work.
//!
//! [`Scheduler`] is a thin handle over a [`TaskTracker`] plus a
//! [`CancellationToken`]. Everything the engine defers runs through it:
//! auto-advance steps, per-state timeouts, retry backoff, limiter recovery
//! ticks, the dedup sweeper and transport dispatches.
//!
//! ## Rules
//! - Scheduled bodies must be brief and non-blocking.
//! - Every body must re-read the state it acts on; tasks outlive the moment
//!   they were armed for, and stale tasks must be no-ops.
//! - Panics inside scheduled work are caught and logged; they never take the
//!   engine down.
//! - [`Scheduler::shutdown`] drains: no new work is admitted, running work
//!   gets a grace window, stragglers are cancelled.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use futures::FutureExt;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::error;

use crate::error::EngineError;

/// Handle to the engine's shared timer pool.
#[derive(Clone)]
pub struct Scheduler {
    tracker: TaskTracker,
    token: CancellationToken,
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            tracker: TaskTracker::new(),
            token: CancellationToken::new(),
        }
    }

    /// Token cancelled when the scheduler shuts down. Long-running scheduled
    /// work should select against it.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Runs `f` after `delay`, unless shutdown comes first.
    pub fn schedule<F>(&self, delay: Duration, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                _ = time::sleep(delay) => {
                    if std::panic::catch_unwind(AssertUnwindSafe(f)).is_err() {
                        error!("scheduled task panicked");
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// Runs a future until completion or shutdown.
    pub fn spawn<Fut>(&self, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            tokio::select! {
                res = AssertUnwindSafe(fut).catch_unwind() => {
                    if res.is_err() {
                        error!("scheduled task panicked");
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// Runs a service loop that lives for the engine's lifetime. Detached
    /// tasks still stop on shutdown but do not count against the drain, so
    /// an always-on loop cannot exhaust the grace window.
    pub fn spawn_detached<Fut>(&self, fut: Fut)
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = self.token.clone();
        tokio::spawn(async move {
            tokio::select! {
                res = AssertUnwindSafe(fut).catch_unwind() => {
                    if res.is_err() {
                        error!("detached service task panicked");
                    }
                }
                _ = token.cancelled() => {}
            }
        });
    }

    /// Drains scheduled work within the grace window, then cancels whatever
    /// is left.
    pub async fn shutdown(&self, grace: Duration) -> Result<(), EngineError> {
        self.tracker.close();
        let drained = time::timeout(grace, self.tracker.wait()).await.is_ok();
        self.token.cancel();
        if drained {
            Ok(())
        } else {
            Err(EngineError::GraceExceeded { grace })
        }
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn scheduled_work_runs_after_delay() {
        let scheduler = Scheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        scheduler.schedule(Duration::from_millis(10), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shutdown_cancels_pending_work() {
        let scheduler = Scheduler::new();
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        scheduler.schedule(Duration::from_secs(60), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        scheduler
            .shutdown(Duration::from_millis(20))
            .await
            .expect_err("pending far-future work should exceed the grace");
        assert_eq!(hits.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn a_panicking_task_does_not_poison_the_pool() {
        let scheduler = Scheduler::new();
        scheduler.schedule(Duration::from_millis(5), || panic!("boom"));
        let hits = Arc::new(AtomicUsize::new(0));
        let h = Arc::clone(&hits);
        scheduler.schedule(Duration::from_millis(10), move || {
            h.fetch_add(1, Ordering::SeqCst);
        });
        time::sleep(Duration::from_millis(50)).await;
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        scheduler.shutdown(Duration::from_millis(100)).await.unwrap();
    }
}
