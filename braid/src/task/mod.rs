//! Units of work executed by a [`Scheduler`](crate::runtime::Scheduler).

use crate::context;

// Public API
pub mod error;
pub use self::error::TaskError;

pub mod id;
pub use self::id::{Id, try_id};

mod task;
pub use self::task::Task;

// Internals
pub(crate) mod harness;

pub(crate) mod raw;

/// Checks if the future of the currently running task was cancelled.
///
/// Cancellation is cooperative: long running tasks should check this
/// periodically and return early. Whatever they return after cancellation is
/// discarded. Returns `false` outside of a task.
///
/// ```
/// use braid::runtime::Builder;
/// use braid::task;
///
/// # fn main() -> anyhow::Result<()> {
/// let scheduler = Builder::new().worker_threads(1).try_build()?;
///
/// let future = scheduler.spawn(|| {
///     let mut rounds = 0_u64;
///     while !task::is_cancelled() {
///         rounds += 1;
///         std::thread::yield_now();
///     }
///     rounds
/// })?;
///
/// assert!(future.cancel());
/// assert!(future.get().is_err_and(|e| e.is_cancelled()));
/// # Ok(())
/// # }
/// ```
pub fn is_cancelled() -> bool {
    context::is_current_task_cancelled()
}
