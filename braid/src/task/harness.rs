use crate::context::{self, TaskFrame, TaskFrameGuard};
use crate::runtime::trace::TraceKind;
use crate::task::task::TaskFn;
use crate::task::{Id, TaskError};
use std::panic;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

/// Runs a task body to completion on the current thread.
///
/// This is the only place where user code is called. Errors returned by the
/// body and panics raised by it are both turned into a [`TaskError`], so the
/// calling worker never unwinds.
pub(crate) fn execute<T>(
    id: Id,
    cancelled: Arc<AtomicBool>,
    op: TaskFn<T>,
) -> Result<T, TaskError> {
    let _guard = TaskFrameGuard::enter(TaskFrame { id, cancelled });

    context::trace(TraceKind::TaskStarted(id));
    tracing::trace!(task.id = %id, "running task");

    let res = match panic::catch_unwind(panic::AssertUnwindSafe(op)) {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(error)) => Err(TaskError::failed(id, error)),
        Err(payload) => Err(parse_panic(id, payload)),
    };

    match &res {
        Ok(_) => {
            context::trace(TraceKind::TaskCompleted(id));
            tracing::trace!(task.id = %id, "task completed");
        }
        Err(err) => {
            context::trace(TraceKind::TaskFailed(id));
            tracing::debug!(task.id = %id, error = %err, "task failed");
        }
    }

    res
}

#[cold]
fn parse_panic(id: Id, payload: Box<dyn std::any::Any + Send + 'static>) -> TaskError {
    let err = TaskError::panic(id, payload);
    tracing::warn!(task.id = %id, error = %err, "task panicked, panic captured");
    err
}
