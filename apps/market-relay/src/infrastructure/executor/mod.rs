//! Task Executors
//!
//! - `TokioExecutor`: spawns side effects onto the runtime and tracks them so
//!   shutdown can wait for in-flight publishes.
//! - `DeferredExecutor`: queues side effects and runs them on demand, in
//!   submission order. Used by tests that need deterministic ordering.

use std::time::Duration;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio_util::task::TaskTracker;
use tracing::{info, warn};

use crate::application::ports::TaskExecutor;

// =============================================================================
// Tokio Executor
// =============================================================================

/// Runtime-backed executor.
#[derive(Debug, Clone, Default)]
pub struct TokioExecutor {
    tracker: TaskTracker,
}

impl TokioExecutor {
    /// Create an executor with an open tracker.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks still running.
    #[must_use]
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Stop accepting tasks and wait up to `timeout` for the rest to finish.
    ///
    /// Returns `true` if everything finished in time.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let in_flight = self.tracker.len();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight side effects");
        }
        if tokio::time::timeout(timeout, self.tracker.wait()).await.is_ok() {
            true
        } else {
            warn!(
                remaining = self.tracker.len(),
                timeout_secs = timeout.as_secs(),
                "Shutdown timeout reached, abandoning side effects"
            );
            false
        }
    }
}

impl TaskExecutor for TokioExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.tracker.spawn(task);
    }
}

// =============================================================================
// Deferred Executor
// =============================================================================

/// Queues tasks until [`DeferredExecutor::run_pending`] is awaited.
#[derive(Default)]
pub struct DeferredExecutor {
    queue: Mutex<Vec<BoxFuture<'static, ()>>>,
}

impl std::fmt::Debug for DeferredExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredExecutor")
            .field("pending", &self.pending())
            .finish()
    }
}

impl DeferredExecutor {
    /// Empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Tasks waiting to run.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.queue.lock().len()
    }

    /// Run every queued task to completion, in submission order, including
    /// tasks queued while running. Returns how many ran.
    pub async fn run_pending(&self) -> usize {
        let mut ran = 0;
        loop {
            let batch = std::mem::take(&mut *self.queue.lock());
            if batch.is_empty() {
                return ran;
            }
            for task in batch {
                task.await;
                ran += 1;
            }
        }
    }
}

impl TaskExecutor for DeferredExecutor {
    fn spawn(&self, task: BoxFuture<'static, ()>) {
        self.queue.lock().push(task);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[tokio::test]
    async fn deferred_runs_in_order() {
        let executor = DeferredExecutor::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for i in 0..3 {
            let log = Arc::clone(&log);
            executor.spawn(Box::pin(async move { log.lock().push(i) }));
        }
        assert_eq!(executor.pending(), 3);
        assert!(log.lock().is_empty());
        assert_eq!(executor.run_pending().await, 3);
        assert_eq!(*log.lock(), vec![0, 1, 2]);
        assert_eq!(executor.pending(), 0);
    }

    #[tokio::test]
    async fn tokio_executor_waits_on_shutdown() {
        let executor = TokioExecutor::new();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..4 {
            let done = Arc::clone(&done);
            executor.spawn(Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                done.fetch_add(1, Ordering::SeqCst);
            }));
        }
        assert!(executor.shutdown(Duration::from_secs(5)).await);
        assert_eq!(done.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_executor_shutdown_times_out() {
        let executor = TokioExecutor::new();
        executor.spawn(Box::pin(async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }));
        assert!(!executor.shutdown(Duration::from_millis(10)).await);
        assert_eq!(executor.in_flight(), 1);
    }
}
