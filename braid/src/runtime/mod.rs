//! Work-stealing thread pool executing [`Task`](crate::task::Task)s.

// Public API
pub mod builder;
pub use builder::Builder;

pub(crate) mod scheduler;
pub use scheduler::{Handle, Scheduler};

pub mod trace;
pub use trace::{TraceEvent, TraceKind, WorkerId};

mod metrics;
pub use metrics::MetricsSnapshot;

// Internals
mod pool;
mod shared;
mod worker;
