use crate::context;
use std::sync::atomic::{AtomicU64, Ordering};

use std::{fmt, num::NonZeroU64};

/// An opaque ID that uniquely identifies a task relative to all other tasks
/// created by this process.
///
/// Every [`Task`] gets an ID on creation, and the [`Future`] returned by
/// [`submit`] carries the same ID. Continuations get fresh IDs of their own.
///
/// # Notes
///
/// - Task IDs are *not* sequential across threads, and do not indicate the
///   order in which tasks are executed.
/// - The task ID of the currently running task can be obtained from inside the
///   task via [`task::try_id()`](crate::task::try_id()).
///
/// [`Task`]: crate::task::Task
/// [`Future`]: crate::future::Future
/// [`submit`]: crate::runtime::Handle::submit
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, PartialOrd, Ord)]
pub struct Id(pub(crate) NonZeroU64);

/// Returns the [`Id`] of the currently running task, or `None` if called outside
/// of a task.
///
/// Continuations executed inline report their own ID, not the ID of the task
/// whose completion triggered them.
pub fn try_id() -> Option<Id> {
    context::current_task_id()
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl Id {
    pub(crate) fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);

        let id = COUNTER.fetch_add(1, Ordering::Relaxed);

        // Safety: this number is unimaginably large, even if we were creating
        // 1 billion task/sec, it would take 584 years to wrap around.
        let Some(id) = NonZeroU64::new(id) else {
            Self::exhausted();
        };

        Self(id)
    }

    #[cold]
    fn exhausted() -> ! {
        panic!("failed to generate unique task ID: bitspace exhausted")
    }

    pub fn as_u64(&self) -> u64 {
        self.0.get()
    }
}
