//! Thread-local state: which scheduler a worker thread belongs to, and which
//! task the current thread is executing.

use crate::runtime::scheduler::SchedulerId;
use crate::runtime::trace::{TraceKind, Tracer};
use crate::task::Id;
use std::cell::RefCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Installed once per worker thread, before it enters its event loop.
#[derive(Debug)]
pub(crate) struct WorkerContext {
    pub(crate) scheduler_id: SchedulerId,
    pub(crate) tracer: Tracer,
}

/// The task being executed on this thread. Frames nest when a task registers
/// a continuation on an already completed future, as the continuation then
/// runs inline on the same stack.
#[derive(Debug, Clone)]
pub(crate) struct TaskFrame {
    pub(crate) id: Id,
    pub(crate) cancelled: Arc<AtomicBool>,
}

thread_local! {
    static WORKER: RefCell<Option<WorkerContext>> = const { RefCell::new(None) };

    static CURRENT_TASK: RefCell<Option<TaskFrame>> = const { RefCell::new(None) };
}

pub(crate) fn init_worker_context(ctx: WorkerContext) {
    WORKER.with(|w| {
        let prev = w.borrow_mut().replace(ctx);
        debug_assert!(prev.is_none(), "worker context initialized twice");
    });
}

pub(crate) fn clear_worker_context() {
    WORKER.with(|w| w.borrow_mut().take());
}

pub(crate) fn is_worker_thread() -> bool {
    WORKER.with(|w| w.borrow().is_some())
}

pub(crate) fn is_worker_of(scheduler_id: SchedulerId) -> bool {
    WORKER.with(|w| {
        w.borrow()
            .as_ref()
            .is_some_and(|ctx| ctx.scheduler_id == scheduler_id)
    })
}

/// Emits a trace event if the current thread is a worker. Events raised on
/// other threads (inline continuations run by the registering thread) have no
/// worker identity to report and are skipped.
pub(crate) fn trace(kind: TraceKind) {
    WORKER.with(|w| {
        if let Some(ctx) = w.borrow().as_ref() {
            ctx.tracer.emit(kind);
        }
    });
}

pub(crate) fn current_task_id() -> Option<Id> {
    CURRENT_TASK.with(|t| t.borrow().as_ref().map(|frame| frame.id))
}

pub(crate) fn is_current_task_cancelled() -> bool {
    CURRENT_TASK.with(|t| {
        t.borrow()
            .as_ref()
            .is_some_and(|frame| frame.cancelled.load(Ordering::Acquire))
    })
}

/// Set and clear the current task frame when a task body is executed.
pub(crate) struct TaskFrameGuard {
    parent: Option<TaskFrame>,
}

impl TaskFrameGuard {
    pub(crate) fn enter(frame: TaskFrame) -> Self {
        TaskFrameGuard {
            parent: CURRENT_TASK.with(|t| t.borrow_mut().replace(frame)),
        }
    }
}

impl Drop for TaskFrameGuard {
    fn drop(&mut self) {
        let parent = self.parent.take();
        CURRENT_TASK.with(|t| *t.borrow_mut() = parent);
    }
}
