//! A small work-stealing thread pool with composable futures.
//!
//! Tasks are submitted to a [`Scheduler`], which runs them on a fixed set of
//! worker threads and hands back a [`Future`]. Futures can be awaited with
//! [`Future::get`] or chained with continuations such as
//! [`Future::then_apply`], which run once the antecedent completes.
//!
//! ```
//! use braid::runtime::Builder;
//!
//! # fn main() -> anyhow::Result<()> {
//! let scheduler = Builder::new().worker_threads(4).try_build()?;
//!
//! let printed = scheduler
//!     .spawn(|| fastrand::u32(..100))?
//!     .then_apply(|n| format!("got {n}"));
//!
//! assert!(printed.get()?.starts_with("got "));
//! scheduler.shutdown()?;
//! # Ok(())
//! # }
//! ```

mod context;

pub mod future;
pub use future::Future;

pub mod runtime;
pub use runtime::{Builder, Handle, Scheduler};

pub mod task;
pub use task::{Task, TaskError};

mod utils;

#[cfg(test)]
mod test_utils;
