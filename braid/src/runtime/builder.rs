use crate::runtime::Scheduler;
use crate::runtime::trace::{TraceEvent, TraceHook};
use anyhow::{Result, anyhow};
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;

/// Maximum number of stealing attempts.
const MAX_STEAL_RETRIES: usize = 3;

#[derive(Clone)]
pub(crate) struct ThreadNameFn(pub(crate) Arc<dyn Fn() -> String + Send + Sync + 'static>);

fn default_thread_name_fn() -> ThreadNameFn {
    let worker_count = Arc::new(AtomicUsize::new(0));

    ThreadNameFn(Arc::new(move || {
        let id = worker_count.fetch_add(1, Ordering::Relaxed);
        format!("braid-{}", id)
    }))
}

impl fmt::Debug for ThreadNameFn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // We print a placeholder since the closure itself isn't printable.
        f.debug_tuple("ThreadNameFn").field(&"<function>").finish()
    }
}

/// Configures and builds a [`Scheduler`].
///
/// ```
/// use braid::runtime::Builder;
///
/// # fn main() -> anyhow::Result<()> {
/// let scheduler = Builder::new()
///     .worker_threads(4)
///     .thread_name("pool")
///     .try_build()?;
///
/// assert_eq!(scheduler.worker_threads(), 4);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Builder {
    /// The number of worker threads. Defaults to 1 per core.
    worker_threads: Option<usize>,

    /// Name fn used for threads spawned by the scheduler.
    thread_name: ThreadNameFn,

    /// Stack size used for threads spawned by the scheduler.
    thread_stack_size: Option<usize>,

    /// How many times a worker will loop over the global injector queue and
    /// other workers' queues to try and find work, before parking.
    max_steal_retries: usize,

    trace_hook: Option<TraceHook>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    pub fn new() -> Builder {
        Builder {
            worker_threads: None,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            max_steal_retries: MAX_STEAL_RETRIES,
            trace_hook: None,
        }
    }

    /// The number of worker threads in the pool.
    ///
    /// Defaults to 1 worker per CPU core.
    #[track_caller]
    pub fn worker_threads(mut self, val: usize) -> Self {
        assert!(val > 0, "worker_threads must be greater than 0");
        self.worker_threads = Some(val);
        self
    }

    /// Sets name of threads spawned by the `Scheduler`'s thread pool.
    ///
    /// The default name is "braid-{id}", where id is monotonically
    /// increasing.
    pub fn thread_name(mut self, val: impl Into<String>) -> Self {
        let val = val.into();
        self.thread_name = ThreadNameFn(Arc::new(move || val.clone()));
        self
    }

    /// Sets a function used to generate the name of threads spawned by the
    /// `Scheduler`'s thread pool.
    pub fn thread_name_fn<F>(mut self, f: F) -> Self
    where
        F: Fn() -> String + Send + Sync + 'static,
    {
        self.thread_name = ThreadNameFn(Arc::new(f));
        self
    }

    /// Sets the stack size (in bytes) for worker threads.
    ///
    /// The actual stack size may be greater than this value if the platform
    /// specifies minimal stack size.
    pub fn thread_stack_size(mut self, val: usize) -> Self {
        self.thread_stack_size = Some(val);
        self
    }

    #[track_caller]
    pub fn max_steal_retries(mut self, val: usize) -> Self {
        assert!(val > 0, "max_steal_retries must be greater than 0");
        self.max_steal_retries = val;
        self
    }

    /// Installs a hook receiving every worker and task lifecycle event, see
    /// [`trace`](crate::runtime::trace).
    pub fn on_trace<F>(mut self, hook: F) -> Self
    where
        F: Fn(&TraceEvent) + Send + Sync + 'static,
    {
        self.trace_hook = Some(TraceHook(Arc::new(hook)));
        self
    }

    /// Creates the configured `Scheduler`.
    ///
    /// The worker threads are running when this returns, and the scheduler
    /// is ready to accept tasks.
    pub fn try_build(self) -> Result<Scheduler> {
        let cfg = RuntimeConfig::try_from(self)?;
        Scheduler::start(cfg)
    }
}

// Export the builder as a RuntimeConfig object to be consumed by the scheduler
// and each of its workers.
#[derive(Debug, Clone)]
pub(crate) struct RuntimeConfig {
    pub(crate) worker_threads: usize,
    pub(crate) thread_name: ThreadNameFn,
    pub(crate) thread_stack_size: Option<usize>,
    pub(crate) max_steal_retries: usize,
    pub(crate) trace_hook: Option<TraceHook>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            worker_threads: 1,
            thread_name: default_thread_name_fn(),
            thread_stack_size: None,
            max_steal_retries: MAX_STEAL_RETRIES,
            trace_hook: None,
        }
    }
}

impl RuntimeConfig {
    fn validate(&self) -> Result<()> {
        if self.worker_threads == 0 {
            return Err(anyhow!("worker_threads must be greater than 0"));
        }

        if self.max_steal_retries == 0 {
            return Err(anyhow!("max_steal_retries must be greater than 0"));
        }

        Ok(())
    }
}

impl TryFrom<Builder> for RuntimeConfig {
    type Error = anyhow::Error;

    fn try_from(builder: Builder) -> Result<Self, Self::Error> {
        let worker_threads = match builder.worker_threads {
            Some(n) => n,
            None => thread::available_parallelism()?.get(),
        };

        let cfg = RuntimeConfig {
            worker_threads,
            thread_name: builder.thread_name,
            thread_stack_size: builder.thread_stack_size,
            max_steal_retries: builder.max_steal_retries,
            trace_hook: builder.trace_hook,
        };

        cfg.validate()?;

        Ok(cfg)
    }
}
