//! Handles to the eventual result of a task.
//!
//! A [`Future`] is returned by [`Handle::submit`] and by every chaining
//! method. It can be cloned freely: all clones observe the same result.
//!
//! # Lost failures
//!
//! A failed future that is never awaited (no call to [`Future::get`] and
//! friends) and has no continuations never surfaces its failure. Dropping the
//! last handle to such a future logs the failure at `debug` level and nothing
//! else happens.
//!
//! [`Handle::submit`]: crate::runtime::Handle::submit

mod continuation;
mod trampoline;

pub(crate) mod state;
pub use state::Status;
pub(crate) use state::{Core, Outcome};

use crate::context;
use crate::task::{Id, TaskError};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

/// Handle to the eventual result of a task.
///
/// The underlying state moves exactly once from [`Status::Pending`] to one of
/// the terminal states `Completed`, `Failed` or `Cancelled`.
///
/// ```
/// use braid::runtime::Builder;
///
/// # fn main() -> anyhow::Result<()> {
/// let scheduler = Builder::new().worker_threads(2).try_build()?;
///
/// let answer = scheduler.spawn(|| 21)?.then_apply(|n| n * 2);
/// assert_eq!(answer.get()?, 42);
/// # Ok(())
/// # }
/// ```
pub struct Future<T: 'static> {
    core: Arc<Core<T>>,
}

impl<T: 'static> Clone for Future<T> {
    fn clone(&self) -> Self {
        Future {
            core: Arc::clone(&self.core),
        }
    }
}

impl<T: Send + Sync + 'static> Future<T> {
    pub(crate) fn pending(id: Id) -> Self {
        Future {
            core: Arc::new(Core::new(id)),
        }
    }

    /// Returns a future that is already completed with `value`.
    pub fn completed(value: T) -> Self {
        let future = Self::pending(Id::next());
        future.core.complete(Outcome::Completed(value));
        future
    }

    /// Returns a future that already failed with `error`.
    pub fn failed(error: anyhow::Error) -> Self {
        let future = Self::pending(Id::next());
        let err = TaskError::failed(future.id(), error);
        future.core.complete(Outcome::Failed(err));
        future
    }

    /// Stores the result of the task. Returns false if the future was
    /// already terminal, typically because it was cancelled.
    pub(crate) fn complete(&self, res: Result<T, TaskError>) -> bool {
        let outcome = match res {
            Ok(value) => Outcome::Completed(value),
            Err(err) => Outcome::Failed(err),
        };

        self.core.complete(outcome)
    }

    /// Cancels the future if it is still pending.
    ///
    /// The future moves to [`Status::Cancelled`] right away and its
    /// continuations observe a [`TaskError::Cancelled`]. Cancellation is
    /// cooperative: a task that has not started yet is skipped, a running
    /// task keeps running until it checks [`task::is_cancelled`] or returns,
    /// and its result is then discarded.
    ///
    /// Returns false if the future was already terminal.
    ///
    /// [`task::is_cancelled`]: crate::task::is_cancelled
    pub fn cancel(&self) -> bool {
        if self.is_done() {
            return false;
        }

        // Raised before the continuations run so that the running task sees it
        // at once. If the task still completes first, `cancel` returns false.
        self.core.cancelled.store(true, Ordering::Release);

        let cancelled = self.core.complete(Outcome::Cancelled);
        if cancelled {
            tracing::trace!(task.id = %self.id(), "future cancelled");
        }
        cancelled
    }
}

impl<T: 'static> Future<T> {
    /// Returns the [task ID] of the task producing this future.
    ///
    /// [task ID]: crate::task::Id
    pub fn id(&self) -> Id {
        self.core.id
    }

    pub fn status(&self) -> Status {
        self.core.status()
    }

    /// Checks if the future reached a terminal state.
    pub fn is_done(&self) -> bool {
        self.status() != Status::Pending
    }

    pub(crate) fn core(&self) -> &Arc<Core<T>> {
        &self.core
    }

    /// Blocks the calling thread until the future reaches a terminal state.
    ///
    /// Calling this from a worker thread while the future is pending ties up
    /// that worker; if every worker ends up waiting this way, the pool
    /// deadlocks.
    pub fn wait(&self) {
        self.warn_if_blocking_worker();
        self.core.wait();
    }

    fn warn_if_blocking_worker(&self) {
        if !self.is_done() && context::is_worker_thread() {
            tracing::warn!(
                task.id = %self.id(),
                current_task.id = ?context::current_task_id(),
                "blocking a worker thread on a pending future"
            );
        }
    }
}

impl<T: Clone + 'static> Future<T> {
    /// Blocks until the future reaches a terminal state, then returns a clone
    /// of the value or the stored failure.
    ///
    /// See [`Future::wait`] about calling this from inside a task.
    pub fn get(&self) -> Result<T, TaskError> {
        self.warn_if_blocking_worker();
        let outcome = self.core.wait();
        self.core.resolve(outcome).cloned()
    }

    /// Returns the result if the future is terminal, without blocking.
    pub fn try_get(&self) -> Option<Result<T, TaskError>> {
        self.core.observe().map(|res| res.cloned())
    }

    /// Like [`Future::get`], but gives up after `timeout`. Returns `None` if
    /// the future is still pending by then.
    ///
    /// A timeout too large to be represented as a deadline waits forever.
    pub fn get_timeout(&self, timeout: Duration) -> Option<Result<T, TaskError>> {
        self.warn_if_blocking_worker();
        let outcome = match Instant::now().checked_add(timeout) {
            Some(deadline) => self.core.wait_until(deadline)?,
            None => self.core.wait(),
        };
        Some(self.core.resolve(outcome).cloned())
    }
}

impl<T: 'static> fmt::Debug for Future<T> {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt.debug_struct("Future")
            .field("id", &self.id())
            .field("status", &self.status())
            .finish()
    }
}
