use crate::task::Id;
use std::any::Any;
use std::sync::Arc;

/// Failure stored on a [`Future`] and returned by [`Future::get`].
///
/// The same value is handed to every consumer of a failed future: callers of
/// `get`, and every continuation chained on it. Cloning is cheap, the
/// underlying error is reference counted.
///
/// [`Future`]: crate::future::Future
/// [`Future::get`]: crate::future::Future::get
#[derive(thiserror::Error, Debug, Clone)]
pub enum TaskError {
    /// The task body returned an error.
    #[error("task {id} failed: {error:#}")]
    Failed { id: Id, error: Arc<anyhow::Error> },

    /// The task body panicked. The panic was caught on the worker, the
    /// worker keeps running.
    #[error("task {id} panicked: {message}")]
    Panicked { id: Id, message: String },

    #[error("task {id} was cancelled")]
    Cancelled { id: Id },

    /// The scheduler was shut down before the task could run.
    #[error("scheduler is closed and no longer accepts tasks")]
    SchedulerClosed,
}

impl TaskError {
    pub(crate) fn failed(id: Id, error: anyhow::Error) -> Self {
        TaskError::Failed {
            id,
            error: Arc::new(error),
        }
    }

    pub(crate) fn panic(id: Id, payload: Box<dyn Any + Send + 'static>) -> Self {
        TaskError::Panicked {
            id,
            message: panic_payload_as_str(&*payload)
                .unwrap_or("unknown panic payload")
                .to_string(),
        }
    }

    pub(crate) fn cancelled(id: Id) -> Self {
        TaskError::Cancelled { id }
    }

    /// Returns the ID of the task that raised this error. A closed scheduler
    /// is not tied to any task.
    pub fn id(&self) -> Option<Id> {
        match self {
            TaskError::Failed { id, .. }
            | TaskError::Panicked { id, .. }
            | TaskError::Cancelled { id } => Some(*id),
            TaskError::SchedulerClosed => None,
        }
    }

    pub fn is_panic(&self) -> bool {
        matches!(self, TaskError::Panicked { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, TaskError::Cancelled { .. })
    }

    pub fn is_scheduler_closed(&self) -> bool {
        matches!(self, TaskError::SchedulerClosed)
    }

    /// The error returned by the task body, if any.
    pub fn failure(&self) -> Option<&anyhow::Error> {
        match self {
            TaskError::Failed { error, .. } => Some(&**error),
            _ => None,
        }
    }

    /// Attempts to downcast the task body's error to a concrete type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::fmt::Display + std::fmt::Debug + Send + Sync + 'static,
    {
        self.failure().and_then(|e| e.downcast_ref::<E>())
    }
}

// Errors propagated through a chain are the *same* error, so task failures
// compare by identity rather than by message.
impl PartialEq for TaskError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Failed { id: a, error: e1 }, Self::Failed { id: b, error: e2 }) => {
                a == b && Arc::ptr_eq(e1, e2)
            }
            (
                Self::Panicked { id: a, message: m1 },
                Self::Panicked { id: b, message: m2 },
            ) => a == b && m1 == m2,
            (Self::Cancelled { id: a }, Self::Cancelled { id: b }) => a == b,
            (Self::SchedulerClosed, Self::SchedulerClosed) => true,
            _ => false,
        }
    }
}

pub(crate) fn panic_payload_as_str(payload: &(dyn Any + Send)) -> Option<&str> {
    if let Some(s) = payload.downcast_ref::<String>() {
        return Some(s);
    }

    if let Some(s) = payload.downcast_ref::<&'static str>() {
        return Some(s);
    }

    None
}
