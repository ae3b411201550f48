use crate::context;
use crate::future::Future;
use crate::runtime::trace::TraceKind;
use crate::task::{Id, Task, TaskError, harness};
use std::fmt;
use std::sync::Arc;

/// How a scheduled task ended, as far as the scheduler is concerned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Ran {
    Completed,
    Failed,
    Cancelled,
}

/// Type-erased task paired with the future it completes. This is what sits
/// in the scheduler queues.
pub(crate) struct RawTask {
    id: Id,
    inner: Box<dyn Schedulable>,
}

trait Schedulable: Send + 'static {
    fn run(self: Box<Self>) -> Ran;

    fn reject(self: Box<Self>, err: TaskError);
}

struct Scheduled<T: 'static> {
    task: Task<T>,
    future: Future<T>,
}

impl<T: Send + Sync + 'static> Schedulable for Scheduled<T> {
    fn run(self: Box<Self>) -> Ran {
        run_task(self.task, &self.future)
    }

    fn reject(self: Box<Self>, err: TaskError) {
        self.future.complete(Err(err));
    }
}

impl RawTask {
    pub(crate) fn new<T: Send + Sync + 'static>(task: Task<T>, future: Future<T>) -> Self {
        debug_assert_eq!(task.id(), future.id());
        RawTask {
            id: task.id(),
            inner: Box::new(Scheduled { task, future }),
        }
    }

    pub(crate) fn id(&self) -> Id {
        self.id
    }

    /// Runs the task on the current thread and completes its future.
    pub(crate) fn run(self) -> Ran {
        self.inner.run()
    }

    /// Fails the task's future without running the task.
    pub(crate) fn reject(self, err: TaskError) {
        tracing::trace!(task.id = %self.id, error = %err, "task rejected");
        self.inner.reject(err);
    }
}

impl fmt::Debug for RawTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawTask").field("id", &self.id).finish()
    }
}

/// Executes `task` and stores its result on `future`. A future that is
/// already terminal at this point was cancelled, the task is skipped.
pub(crate) fn run_task<T: Send + Sync + 'static>(task: Task<T>, future: &Future<T>) -> Ran {
    let (id, op) = task.into_parts();

    if future.is_done() {
        context::trace(TraceKind::TaskCancelled(id));
        tracing::trace!(task.id = %id, "skipping cancelled task");
        return Ran::Cancelled;
    }

    let res = harness::execute(id, Arc::clone(&future.core().cancelled), op);
    let ran = match &res {
        Ok(_) => Ran::Completed,
        Err(_) => Ran::Failed,
    };

    // Cancelled while running: the result is dropped.
    if !future.complete(res) {
        context::trace(TraceKind::TaskCancelled(id));
        return Ran::Cancelled;
    }

    ran
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::future::Status;
    use anyhow::anyhow;
    use static_assertions::assert_impl_all;

    assert_impl_all!(RawTask: Send);

    fn scheduled<T: Send + Sync + 'static>(task: Task<T>) -> (RawTask, Future<T>) {
        let future = Future::pending(task.id());
        (RawTask::new(task, future.clone()), future)
    }

    #[test]
    fn test_run_completes_future() -> anyhow::Result<()> {
        let (raw, future) = scheduled(Task::new(|| "done"));

        assert_eq!(raw.run(), Ran::Completed);
        assert_eq!(future.get()?, "done");
        Ok(())
    }

    #[test]
    fn test_run_failure_completes_future() {
        let (raw, future) = scheduled(Task::<u8>::try_new(|| Err(anyhow!("bad input"))));

        assert_eq!(raw.run(), Ran::Failed);
        assert_eq!(future.status(), Status::Failed);
    }

    #[test]
    fn test_cancelled_task_is_skipped() {
        let (raw, future) = scheduled(Task::new(|| -> u8 { panic!("must not run") }));

        assert!(future.cancel());
        assert_eq!(raw.run(), Ran::Cancelled);
        assert_eq!(future.status(), Status::Cancelled);
    }

    #[test]
    fn test_reject_fails_future() {
        let (raw, future) = scheduled(Task::new(|| 1_u8));

        raw.reject(TaskError::SchedulerClosed);
        assert_eq!(future.get(), Err(TaskError::SchedulerClosed));
    }
}
