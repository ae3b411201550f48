use crate::future::trampoline::{self, Job};
use crate::task::{Id, TaskError};
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;
use std::{iter, mem};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

// Most futures have zero or one continuation, chains rarely fan out wider.
const INLINE_CONTINUATIONS: usize = 2;

/// Terminal outcome of a future. Written exactly once.
#[derive(Debug)]
pub(crate) enum Outcome<T> {
    Completed(T),
    Failed(TaskError),
    Cancelled,
}

/// Observable state of a [`Future`](crate::future::Future).
///
/// `Pending` is the only non-terminal state. Once a future leaves it, its
/// status never changes again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Pending,
    Completed,
    Failed,
    Cancelled,
}

pub(crate) type Continuation<T> = Box<dyn FnOnce(&Arc<Core<T>>) + Send + 'static>;

/// State shared between every clone of a future and the task producing it.
pub(crate) struct Core<T: 'static> {
    pub(crate) id: Id,

    /// Set under the `continuations` lock, read lock-free once set.
    outcome: OnceLock<Outcome<T>>,

    /// Continuations registered while pending, in registration order. Taken
    /// exactly once by the thread that completes the future.
    continuations: Mutex<SmallVec<[Continuation<T>; INLINE_CONTINUATIONS]>>,

    /// Signalled once `outcome` is set.
    completed: Condvar,

    /// Cooperative cancellation flag, visible to the running task body.
    pub(crate) cancelled: Arc<AtomicBool>,

    /// Whether anyone looked at the outcome. Used to report failures nobody
    /// ever saw.
    observed: AtomicBool,
}

impl<T: 'static> Core<T> {
    pub(crate) fn new(id: Id) -> Self {
        Core {
            id,
            outcome: OnceLock::new(),
            continuations: Mutex::new(SmallVec::new()),
            completed: Condvar::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
            observed: AtomicBool::new(false),
        }
    }

    pub(crate) fn outcome(&self) -> Option<&Outcome<T>> {
        self.outcome.get()
    }

    pub(crate) fn status(&self) -> Status {
        match self.outcome.get() {
            None => Status::Pending,
            Some(Outcome::Completed(_)) => Status::Completed,
            Some(Outcome::Failed(_)) => Status::Failed,
            Some(Outcome::Cancelled) => Status::Cancelled,
        }
    }

    /// Returns the terminal outcome as a result, marking it as observed.
    pub(crate) fn observe(&self) -> Option<Result<&T, TaskError>> {
        self.outcome.get().map(|outcome| self.resolve(outcome))
    }

    pub(crate) fn resolve<'a>(&'a self, outcome: &'a Outcome<T>) -> Result<&'a T, TaskError> {
        self.observed.store(true, Ordering::Relaxed);

        match outcome {
            Outcome::Completed(value) => Ok(value),
            Outcome::Failed(err) => Err(err.clone()),
            Outcome::Cancelled => Err(TaskError::cancelled(self.id)),
        }
    }

    /// Transitions `Pending` to `outcome`, then runs every registered
    /// continuation in registration order on the calling thread.
    ///
    /// When called from within a continuation, the outcome is set right away
    /// but the continuations are queued on the thread's trampoline, so long
    /// chains do not grow the stack.
    ///
    /// Returns false, and drops `outcome`, if the future was already terminal.
    pub(crate) fn complete(self: &Arc<Self>, outcome: Outcome<T>) -> bool {
        let continuations = {
            let mut continuations = self.continuations.lock();

            if self.outcome.set(outcome).is_err() {
                return false;
            }

            self.completed.notify_all();
            mem::take(&mut *continuations)
        };

        // The lock is released, continuations are free to register more
        // continuations on this same future, they will run immediately.
        trampoline::run(continuations.into_iter().map(|continuation| {
            let core = Arc::clone(self);
            Box::new(move || continuation(&core)) as Job
        }));

        true
    }

    /// Registers a continuation. If the future is already terminal the
    /// continuation runs immediately on the calling thread.
    pub(crate) fn register(self: &Arc<Self>, continuation: Continuation<T>) {
        self.observed.store(true, Ordering::Relaxed);

        {
            let mut continuations = self.continuations.lock();
            if self.outcome.get().is_none() {
                continuations.push(continuation);
                return;
            }
        }

        continuation(self);
    }

    /// Blocks until the future is terminal.
    pub(crate) fn wait(&self) -> &Outcome<T> {
        if let Some(outcome) = self.outcome.get() {
            return outcome;
        }

        trampoline::help();

        let mut continuations = self.continuations.lock();
        loop {
            if let Some(outcome) = self.outcome.get() {
                return outcome;
            }
            self.completed.wait(&mut continuations);
        }
    }

    /// Blocks until the future is terminal or `deadline` passes.
    pub(crate) fn wait_until(&self, deadline: Instant) -> Option<&Outcome<T>> {
        if let Some(outcome) = self.outcome.get() {
            return Some(outcome);
        }

        trampoline::help();

        let mut continuations = self.continuations.lock();
        loop {
            if let Some(outcome) = self.outcome.get() {
                return Some(outcome);
            }
            if self
                .completed
                .wait_until(&mut continuations, deadline)
                .timed_out()
            {
                return self.outcome.get();
            }
        }
    }
}

impl<T: 'static> Drop for Core<T> {
    fn drop(&mut self) {
        // Each continuation owns the next future of its chain. Dropping them
        // here would recurse once per link.
        let continuations = mem::take(self.continuations.get_mut());
        if !continuations.is_empty() {
            trampoline::run(iter::once(Box::new(move || drop(continuations)) as Job));
        }

        // A failure nobody awaited and nobody chained on is lost. This is the
        // only path where a task failure is not surfaced to the caller.
        if let Some(Outcome::Failed(err)) = self.outcome.get()
            && !self.observed.load(Ordering::Relaxed)
        {
            tracing::debug!(task.id = %self.id, error = %err, "task failure was never observed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use static_assertions::assert_impl_all;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    assert_impl_all!(Core<u32>: Send, Sync);

    fn core<T: 'static>() -> Arc<Core<T>> {
        Arc::new(Core::new(Id::next()))
    }

    #[test]
    fn test_terminal_state_never_changes() {
        let core = core::<u32>();
        assert_eq!(core.status(), Status::Pending);

        assert!(core.complete(Outcome::Completed(1)));
        assert!(!core.complete(Outcome::Completed(2)));
        assert!(!core.complete(Outcome::Cancelled));

        assert_eq!(core.status(), Status::Completed);
        assert!(matches!(core.observe(), Some(Ok(1))));
    }

    #[test]
    fn test_continuation_runs_once_on_complete() {
        let core = core::<u32>();
        let calls = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&calls);
        core.register(Box::new(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        core.complete(Outcome::Completed(1));
        core.complete(Outcome::Completed(2));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_late_registration_runs_immediately() {
        let core = core::<u32>();
        core.complete(Outcome::Failed(TaskError::failed(core.id, anyhow!("x"))));

        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        core.register(Box::new(move |core: &Arc<Core<u32>>| {
            assert_eq!(core.status(), Status::Failed);
            c.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_wait_until_times_out_while_pending() {
        let core = core::<u32>();
        let deadline = Instant::now() + Duration::from_millis(20);

        assert!(core.wait_until(deadline).is_none());
        assert!(Instant::now() >= deadline);
    }

    #[test]
    fn test_cancelled_observes_as_error() {
        let core = core::<u32>();
        core.complete(Outcome::Cancelled);

        let err = core.observe().and_then(|r| r.err());
        assert_eq!(err, Some(TaskError::cancelled(core.id)));
    }

    #[test]
    fn test_concurrent_register_and_complete_no_lost_or_double_calls() {
        for _ in 0..200 {
            let core = core::<u32>();
            let calls = Arc::new(AtomicUsize::new(0));

            let registrars = (0..4)
                .map(|_| {
                    let core = Arc::clone(&core);
                    let calls = Arc::clone(&calls);
                    std::thread::spawn(move || {
                        for _ in 0..8 {
                            let calls = Arc::clone(&calls);
                            core.register(Box::new(move |_| {
                                calls.fetch_add(1, Ordering::SeqCst);
                            }));
                        }
                    })
                })
                .collect::<Vec<_>>();

            core.complete(Outcome::Completed(0));

            for r in registrars {
                r.join().expect("registrar panicked");
            }
            assert_eq!(calls.load(Ordering::SeqCst), 32);
        }
    }
}
