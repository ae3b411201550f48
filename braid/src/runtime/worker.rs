use crate::context;
use crate::runtime::scheduler::{Inner, Lifecycle};
use crate::runtime::trace::TraceKind;
use crate::task::TaskError;
use crate::task::raw::RawTask;
use crate::utils::ScopeGuard;
use crossbeam_deque::{Stealer, Worker as CbWorker};
use std::iter;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Event loop of a single worker thread. Built on the spawning thread, then
/// moved into the worker thread it drives.
pub(crate) struct Worker {
    index: usize,

    inner: Arc<Inner>,

    /// Local queue, refilled in batches from the global injector. Other
    /// workers steal from it.
    local: CbWorker<RawTask>,

    /// Handle to all of the other worker's local queues. If there are N
    /// workers we will have N-1 queues to steal from.
    stealers: Vec<Stealer<RawTask>>,

    /// Set by whoever unparks this worker.
    should_unpark: Arc<AtomicBool>,
}

impl Worker {
    pub(super) fn new(
        index: usize,
        inner: Arc<Inner>,
        local: CbWorker<RawTask>,
        mut stealers: Vec<Stealer<RawTask>>,
    ) -> Self {
        // Shuffle the stealers so that each worker's search order when trying to
        // steal work is different and hopefully unique to reduce contention.
        fastrand::shuffle(&mut stealers);

        Worker {
            index,
            inner,
            local,
            stealers,
            should_unpark: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(super) fn index(&self) -> usize {
        self.index
    }

    fn find_task(&self) -> Option<RawTask> {
        // 1. Tasks already batched into our local queue.
        self.local.pop().or_else(|| {
            // 2. No local work, repeatedly try the global injector and other
            //    workers local queues.
            iter::repeat_with(|| {
                self.inner
                    .injector
                    .steal_batch_and_pop(&self.local)
                    .or_else(||
                        // The behavior of collect here is to return the first Success(T) so
                        // *we are not* iterating through all stealers everytime.
                        self.stealers.iter().map(|s| s.steal()).collect())
            })
            // Repeat a maximum of `max_steal_retries` otherwise return None.
            .take(self.inner.cfg.max_steal_retries)
            .find(|s| !s.is_retry())
            .and_then(|s| s.success())
        })
    }

    /// Runs tasks until the scheduler shuts down.
    ///
    /// A graceful shutdown lets the worker exit once the injector and its
    /// local queue are both empty. A forced one makes it exit after the task
    /// at hand, failing whatever is left in its local queue.
    pub(super) fn event_loop(self) {
        let _exit = ScopeGuard::new(|| self.exit());

        context::trace(TraceKind::WorkerStarted);
        tracing::debug!(worker = self.index, "worker started");

        loop {
            if matches!(
                self.inner.lifecycle(),
                Lifecycle::Aborting | Lifecycle::Terminated
            ) {
                break;
            }

            if let Some(task) = self.find_task() {
                // Share the rest of a batch taken from the injector with any
                // parked worker.
                if !self.local.is_empty() {
                    self.inner.shared.unpark_one_thread();
                }

                let ran = task.run();
                self.inner.metrics.record(ran);
                continue;
            }

            if !self.inner.is_running() && self.inner.injector.is_empty() {
                break;
            }

            // Park the thread, and wait for new tasks to be scheduled on the
            // global injector and an unpark signal from the scheduler.
            context::trace(TraceKind::WorkerParked);
            self.inner
                .shared
                .park_current_thread(&self.should_unpark, || {
                    !self.inner.injector.is_empty() || !self.inner.is_running()
                });
        }
    }

    fn exit(&self) {
        while let Some(task) = self.local.pop() {
            self.inner.metrics.inc_discarded();
            task.reject(TaskError::SchedulerClosed);
        }

        context::trace(TraceKind::WorkerStopped);
        tracing::debug!(worker = self.index, "worker stopped");
        context::clear_worker_context();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Future;
    use crate::runtime::builder::RuntimeConfig;
    use crate::task::Task;
    use static_assertions::assert_impl_all;

    // Moved into its thread once built.
    assert_impl_all!(Worker: Send);

    #[test]
    fn test_find_task_steals_from_siblings() -> anyhow::Result<()> {
        let inner = Arc::new(Inner::new(RuntimeConfig::default()));
        let sibling = CbWorker::new_fifo();

        let task = Task::new(|| 7_u32);
        let future = Future::pending(task.id());
        sibling.push(RawTask::new(task, future.clone()));

        let worker = Worker::new(0, inner, CbWorker::new_fifo(), vec![sibling.stealer()]);
        let stolen = worker.find_task().expect("sibling queue holds a task");

        assert_eq!(stolen.id(), future.id());
        stolen.run();
        assert_eq!(future.get()?, 7);
        assert!(worker.find_task().is_none());
        Ok(())
    }
}
