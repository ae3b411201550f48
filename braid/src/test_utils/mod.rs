use crate::runtime::{TraceEvent, TraceKind};
use dashmap::DashMap;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber printing thread names, filtered by `RUST_LOG`.
/// Safe to call from every test, only the first call installs it.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Method {
    WorkerStarted,
    WorkerParked,
    WorkerStopped,
    TaskStarted,
    TaskCompleted,
    TaskFailed,
    TaskCancelled,
}

impl From<TraceKind> for Method {
    fn from(kind: TraceKind) -> Self {
        match kind {
            TraceKind::WorkerStarted => Method::WorkerStarted,
            TraceKind::WorkerParked => Method::WorkerParked,
            TraceKind::WorkerStopped => Method::WorkerStopped,
            TraceKind::TaskStarted(_) => Method::TaskStarted,
            TraceKind::TaskCompleted(_) => Method::TaskCompleted,
            TraceKind::TaskFailed(_) => Method::TaskFailed,
            TraceKind::TaskCancelled(_) => Method::TaskCancelled,
        }
    }
}

/// Records trace events, grouped by kind, to assert on them in tests.
#[derive(Debug, Clone, Default)]
pub(crate) struct Tracker {
    events: Arc<DashMap<Method, Vec<TraceEvent>>>,
}

impl Tracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&self, event: &TraceEvent) {
        self.events
            .entry(event.kind.into())
            .or_default()
            .push(event.clone());
    }

    /// Hook to install with [`Builder::on_trace`](crate::runtime::Builder::on_trace).
    pub(crate) fn hook(&self) -> impl Fn(&TraceEvent) + Send + Sync + 'static + use<> {
        let tracker = self.clone();
        move |event: &TraceEvent| tracker.record(event)
    }

    pub(crate) fn get_events(&self, method: &Method) -> Vec<TraceEvent> {
        self.events
            .get(method)
            .map(|events| events.value().clone())
            .unwrap_or_default()
    }

    pub(crate) fn count(&self, method: &Method) -> usize {
        self.events.get(method).map_or(0, |events| events.len())
    }
}
