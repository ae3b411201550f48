use crate::task::Id;
use std::fmt;

pub(crate) type TaskFn<T> = Box<dyn FnOnce() -> anyhow::Result<T> + Send + 'static>;

/// A deferred unit of computation.
///
/// A `Task` wraps a zero-argument operation producing a `T` or an error. It
/// does nothing until it is handed to a scheduler with
/// [`Handle::submit`](crate::runtime::Handle::submit), which takes ownership
/// of it and returns a [`Future`](crate::future::Future) for its result.
///
/// Both returned errors and panics are captured when the task runs, neither
/// unwinds into the worker thread.
///
/// ```
/// use braid::task::Task;
///
/// let task = Task::new(|| 6 * 7);
/// let fallible = Task::try_new(|| "42".parse::<u32>().map_err(anyhow::Error::from));
/// # let _ = (task, fallible);
/// ```
pub struct Task<T> {
    id: Id,
    op: TaskFn<T>,
}

impl<T: Send + 'static> Task<T> {
    /// Creates a task from an infallible operation.
    pub fn new<F>(op: F) -> Self
    where
        F: FnOnce() -> T + Send + 'static,
    {
        Self::try_new(move || Ok(op()))
    }

    /// Creates a task from an operation that may fail. The error is stored on
    /// the task's future as [`TaskError::Failed`](crate::task::TaskError::Failed).
    pub fn try_new<F>(op: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Self::with_id(Id::next(), op)
    }

    pub(crate) fn with_id<F>(id: Id, op: F) -> Self
    where
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        Task {
            id,
            op: Box::new(op),
        }
    }
}

impl<T> Task<T> {
    pub fn id(&self) -> Id {
        self.id
    }

    pub(crate) fn into_parts(self) -> (Id, TaskFn<T>) {
        (self.id, self.op)
    }
}

impl<T> fmt::Debug for Task<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish()
    }
}
