use crate::context;
use crate::future::Future;
use crate::runtime::builder::RuntimeConfig;
use crate::runtime::metrics::{Metrics, MetricsSnapshot};
use crate::runtime::pool::ThreadPool;
use crate::runtime::shared::Shared;
use crate::task::raw::RawTask;
use crate::task::{Task, TaskError};
use anyhow::{Result, bail};
use crossbeam_deque::{Injector, Steal};
use parking_lot::RwLock;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Distinguishes schedulers living in the same process, so that a worker
/// thread knows which pool it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct SchedulerId(u64);

impl SchedulerId {
    fn next() -> Self {
        static NEXT_ID: AtomicU64 = AtomicU64::new(1);
        SchedulerId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SchedulerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    /// Accepting every submission.
    Running,

    /// Graceful shutdown: workers drain the queues before exiting. Only
    /// continuations dispatched by the scheduler's own workers are accepted.
    Draining,

    /// Forced shutdown: workers exit after their current task, queued tasks
    /// are rejected.
    Aborting,

    /// Every worker has been joined.
    Terminated,
}

/// State shared by the scheduler, its handles and its workers.
#[derive(Debug)]
pub(crate) struct Inner {
    pub(crate) id: SchedulerId,

    pub(crate) cfg: RuntimeConfig,

    /// The global injector queue for new tasks.
    pub(crate) injector: Injector<RawTask>,

    /// Parking lot for idle workers.
    pub(crate) shared: Shared,

    /// Held for reading while pushing to the injector, for writing while
    /// changing state. A task pushed while `Running` is therefore always seen
    /// by the shutdown sequence.
    lifecycle: RwLock<Lifecycle>,

    pub(crate) metrics: Metrics,
}

impl Inner {
    pub(crate) fn new(cfg: RuntimeConfig) -> Self {
        Inner {
            id: SchedulerId::next(),
            shared: Shared::new(cfg.worker_threads),
            cfg,
            injector: Injector::new(),
            lifecycle: RwLock::new(Lifecycle::Running),
            metrics: Metrics::default(),
        }
    }

    pub(crate) fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.read()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.lifecycle() == Lifecycle::Running
    }

    pub(crate) fn abort(&self) {
        *self.lifecycle.write() = Lifecycle::Aborting;
    }

    /// Pushes `task` on the injector and wakes up a parked worker.
    ///
    /// `internal` is set for continuations dispatched on behalf of a
    /// completed task, which are still accepted during a graceful shutdown if
    /// they come from one of this scheduler's workers.
    fn schedule(&self, task: RawTask, internal: bool) -> Result<(), TaskError> {
        {
            let lifecycle = self.lifecycle.read();

            let accept = match *lifecycle {
                Lifecycle::Running => true,
                Lifecycle::Draining => internal && context::is_worker_of(self.id),
                Lifecycle::Aborting | Lifecycle::Terminated => false,
            };

            if !accept {
                drop(lifecycle);
                self.metrics.inc_rejected();
                tracing::trace!(task.id = %task.id(), scheduler.id = %self.id, "scheduler closed, rejecting task");
                return Err(TaskError::SchedulerClosed);
            }

            self.metrics.inc_submitted();
            self.injector.push(task);
        }

        // Lifecycle lock is released, workers take it while holding the
        // parking lock.
        self.shared.unpark_one_thread();
        Ok(())
    }

    /// Fails every task left in the injector.
    fn reject_pending(&self) -> usize {
        let mut rejected = 0;

        loop {
            match self.injector.steal() {
                Steal::Success(task) => {
                    rejected += 1;
                    self.metrics.inc_discarded();
                    task.reject(TaskError::SchedulerClosed);
                }
                Steal::Retry => continue,
                Steal::Empty => break,
            }
        }

        rejected
    }
}

/// Cloneable handle used to submit tasks to a [`Scheduler`].
///
/// A handle does not keep the worker threads alive: once the owning
/// [`Scheduler`] is shut down or dropped, every submission through any of its
/// handles fails with [`TaskError::SchedulerClosed`].
#[derive(Debug, Clone)]
pub struct Handle {
    inner: Arc<Inner>,
}

impl Handle {
    /// Enqueues `task` for execution on a worker thread.
    ///
    /// The returned future completes with the task's value, or fails with
    /// its error or panic.
    pub fn submit<T>(&self, task: Task<T>) -> Result<Future<T>, TaskError>
    where
        T: Send + Sync + 'static,
    {
        let future = Future::pending(task.id());
        self.inner
            .schedule(RawTask::new(task, future.clone()), false)?;
        Ok(future)
    }

    /// Shortcut for `submit(Task::new(f))`.
    pub fn spawn<T, F>(&self, f: F) -> Result<Future<T>, TaskError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> T + Send + 'static,
    {
        self.submit(Task::new(f))
    }

    /// Shortcut for `submit(Task::try_new(f))`.
    pub fn try_spawn<T, F>(&self, f: F) -> Result<Future<T>, TaskError>
    where
        T: Send + Sync + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.submit(Task::try_new(f))
    }

    /// Submits a continuation task completing `future`.
    pub(crate) fn dispatch<T>(&self, task: Task<T>, future: Future<T>) -> Result<(), TaskError>
    where
        T: Send + Sync + 'static,
    {
        self.inner.schedule(RawTask::new(task, future), true)
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.inner.metrics.snapshot()
    }

    /// Checks if the scheduler stopped accepting submissions.
    pub fn is_closed(&self) -> bool {
        !self.inner.is_running()
    }

    pub fn worker_threads(&self) -> usize {
        self.inner.cfg.worker_threads
    }
}

/// A fixed pool of worker threads executing [`Task`]s.
///
/// Built with [`Builder`](crate::runtime::Builder). Derefs to its [`Handle`]
/// for submission. Dropping the scheduler performs a graceful
/// [`shutdown`](Scheduler::shutdown).
#[derive(Debug)]
pub struct Scheduler {
    handle: Handle,
    pool: ThreadPool,
}

impl Scheduler {
    pub(crate) fn start(cfg: RuntimeConfig) -> Result<Self> {
        let inner = Arc::new(Inner::new(cfg));
        let pool = ThreadPool::spawn(&inner)?;

        tracing::debug!(
            scheduler.id = %inner.id,
            workers = inner.cfg.worker_threads,
            "scheduler started"
        );

        Ok(Scheduler {
            handle: Handle { inner },
            pool,
        })
    }

    pub fn handle(&self) -> Handle {
        self.handle.clone()
    }

    /// Stops accepting submissions and waits for the queues to drain.
    ///
    /// Every task queued before the call runs, and continuations these tasks
    /// dispatch to this scheduler are still accepted. Returns once every
    /// worker thread has exited. Calling it again is a no-op.
    ///
    /// Fails if called from one of this scheduler's worker threads, or if a
    /// worker thread died.
    pub fn shutdown(&self) -> Result<()> {
        self.shutdown_with(Lifecycle::Draining)
    }

    /// Stops accepting submissions and fails every queued task with
    /// [`TaskError::SchedulerClosed`].
    ///
    /// Tasks already running are not interrupted, returns once they are done
    /// and every worker thread has exited.
    pub fn shutdown_now(&self) -> Result<()> {
        self.shutdown_with(Lifecycle::Aborting)
    }

    fn shutdown_with(&self, target: Lifecycle) -> Result<()> {
        let inner = &self.handle.inner;

        if context::is_worker_of(inner.id) {
            bail!(
                "scheduler {} cannot be shut down from one of its own worker threads",
                inner.id
            );
        }

        {
            let mut lifecycle = inner.lifecycle.write();
            match (*lifecycle, target) {
                (Lifecycle::Terminated, _) => return Ok(()),
                // Never downgrade a forced shutdown.
                (Lifecycle::Aborting, Lifecycle::Draining) => {}
                _ => *lifecycle = target,
            }
        }

        let unparked = inner.shared.unpark_all_threads();
        tracing::debug!(
            scheduler.id = %inner.id,
            mode = ?target,
            unparked,
            "shutting down scheduler"
        );

        let res = self.pool.join_all();

        *inner.lifecycle.write() = Lifecycle::Terminated;

        let rejected = inner.reject_pending();
        tracing::debug!(scheduler.id = %inner.id, rejected, "scheduler terminated");

        res
    }
}

impl Deref for Scheduler {
    type Target = Handle;

    fn deref(&self) -> &Self::Target {
        &self.handle
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            tracing::error!(scheduler.id = %self.handle.inner.id, error = %e, "failed to shut down scheduler");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;

    assert_impl_all!(Scheduler: Send, Sync);
    assert_impl_all!(Handle: Send, Sync, Clone);
    assert_impl_all!(Inner: Send, Sync);

    #[test]
    fn test_scheduler_ids_are_unique() {
        assert_ne!(SchedulerId::next(), SchedulerId::next());
    }

    #[test]
    fn test_draining_rejects_external_submissions() {
        let inner = Inner::new(RuntimeConfig::default());
        *inner.lifecycle.write() = Lifecycle::Draining;

        let task = Task::new(|| 1_u8);
        let future = Future::pending(task.id());

        assert_eq!(
            inner.schedule(RawTask::new(task, future), true),
            Err(TaskError::SchedulerClosed)
        );
        assert!(inner.injector.is_empty());
        assert_eq!(inner.metrics.snapshot().rejected, 1);
    }

    #[test]
    fn test_reject_pending_fails_queued_futures() {
        let inner = Inner::new(RuntimeConfig::default());

        let futures = (0..3)
            .map(|i| {
                let task = Task::new(move || i);
                let future = Future::pending(task.id());
                inner
                    .schedule(RawTask::new(task, future.clone()), false)
                    .map(|_| future)
            })
            .collect::<Result<Vec<_>, _>>();

        let futures = futures.expect("scheduler is running");
        assert_eq!(inner.reject_pending(), 3);

        for future in futures {
            assert_eq!(future.get(), Err(TaskError::SchedulerClosed));
        }

        let metrics = inner.metrics.snapshot();
        assert_eq!(metrics.submitted, 3);
        assert_eq!(metrics.discarded, 3);
        assert_eq!(metrics.in_flight(), 0);
    }
}
