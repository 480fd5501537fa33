//! Executor Port (Driven Port)
//!
//! Handlers never await their side effects. They hand futures to an executor
//! and return, so downstream latency cannot slow the decode loop.

use futures::future::BoxFuture;

/// Runs detached side-effect tasks.
pub trait TaskExecutor: Send + Sync {
    /// Submit a task. Must not block.
    fn spawn(&self, task: BoxFuture<'static, ()>);
}
