use crate::task::raw::Ran;
use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for tasks going through a scheduler. Inline continuations are not
/// scheduled, they are not counted.
#[derive(Debug, Default)]
pub(crate) struct Metrics {
    submitted: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    cancelled: AtomicU64,
    rejected: AtomicU64,
    discarded: AtomicU64,
}

/// Point-in-time copy of a scheduler's task counters.
///
/// `completed + failed + cancelled + discarded` catches up with `submitted` once every
/// accepted task has run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Tasks accepted into the queue.
    pub submitted: u64,
    pub completed: u64,
    pub failed: u64,
    /// Tasks skipped or discarded because their future was cancelled.
    pub cancelled: u64,
    /// Submissions refused because the scheduler was closed.
    pub rejected: u64,
    /// Accepted tasks failed without running by
    /// [`Scheduler::shutdown_now`](crate::runtime::Scheduler::shutdown_now).
    pub discarded: u64,
}

impl MetricsSnapshot {
    /// Accepted tasks that have not finished running yet.
    pub fn in_flight(&self) -> u64 {
        self.submitted
            .saturating_sub(self.completed + self.failed + self.cancelled + self.discarded)
    }
}

impl Metrics {
    pub(crate) fn inc_submitted(&self) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_discarded(&self) {
        self.discarded.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record(&self, ran: Ran) {
        let counter = match ran {
            Ran::Completed => &self.completed,
            Ran::Failed => &self.failed,
            Ran::Cancelled => &self.cancelled,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            cancelled: self.cancelled.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}
