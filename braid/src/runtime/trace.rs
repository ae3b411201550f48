//! Observability hook for worker and task lifecycle events.
//!
//! Install a hook with [`Builder::on_trace`](crate::runtime::Builder::on_trace).
//! The hook is called synchronously on the worker thread where the event
//! happens, so it should be cheap and must not block on the scheduler.

use crate::task::Id;
use std::fmt;
use std::panic;
use std::sync::Arc;

/// Identity of a worker thread.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WorkerId {
    index: usize,
    name: Arc<str>,
}

impl WorkerId {
    pub(crate) fn new(index: usize, name: impl Into<Arc<str>>) -> Self {
        WorkerId {
            index,
            name: name.into(),
        }
    }

    /// Position of the worker in the pool, from 0 to `worker_threads - 1`.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Thread name, as configured with
    /// [`Builder::thread_name`](crate::runtime::Builder::thread_name).
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.name, self.index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TraceKind {
    WorkerStarted,
    /// The worker ran out of work and is about to park.
    WorkerParked,
    WorkerStopped,
    TaskStarted(Id),
    TaskCompleted(Id),
    TaskFailed(Id),
    /// The task was skipped, or its result discarded, because its future was
    /// cancelled.
    TaskCancelled(Id),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    pub worker: WorkerId,
    pub kind: TraceKind,
}

#[derive(Clone)]
pub(crate) struct TraceHook(pub(crate) Arc<dyn Fn(&TraceEvent) + Send + Sync + 'static>);

impl fmt::Debug for TraceHook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TraceHook").field(&"<function>").finish()
    }
}

/// Per-worker emitter, stored in the worker's thread-local context.
#[derive(Debug, Clone)]
pub(crate) struct Tracer {
    worker: WorkerId,
    hook: Option<TraceHook>,
}

impl Tracer {
    pub(crate) fn new(worker: WorkerId, hook: Option<TraceHook>) -> Self {
        Tracer { worker, hook }
    }

    pub(crate) fn emit(&self, kind: TraceKind) {
        let Some(hook) = &self.hook else {
            return;
        };

        let event = TraceEvent {
            worker: self.worker.clone(),
            kind,
        };

        // A panicking hook must not take the worker down with it.
        if panic::catch_unwind(panic::AssertUnwindSafe(|| (hook.0)(&event))).is_err() {
            tracing::warn!(worker = %self.worker, ?kind, "trace hook panicked");
        }
    }
}
