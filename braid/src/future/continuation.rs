use crate::future::{Core, Future, Outcome};
use crate::runtime::Handle;
use crate::task::raw::run_task;
use crate::task::{Id, Task, TaskError};
use anyhow::anyhow;
use std::sync::Arc;

/// Where a continuation body runs once its antecedent completed.
enum Dispatch {
    /// On the thread completing the antecedent, or on the registering thread
    /// if the antecedent is already terminal.
    Inline,

    /// Submitted to a scheduler as a new task.
    Async(Handle),
}

/// Continuation chaining.
///
/// Every method returns a new future for the continuation's own result. If
/// the antecedent fails or is cancelled the continuation body never runs and
/// the new future fails with the antecedent's error.
impl<T: Send + Sync + 'static> Future<T> {
    /// Runs `f` once this future completes successfully, ignoring its value.
    ///
    /// `f` runs inline: on the worker that completes this future, or right
    /// away on the calling thread if this future is already terminal.
    /// Continuations registered on the same future run in registration order.
    pub fn then_run<U, F>(&self, f: F) -> Future<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce() -> U + Send + 'static,
    {
        self.chain(Dispatch::Inline, move |_| Ok(f()))
    }

    /// Runs `f` with a clone of this future's value once it completes
    /// successfully. Runs inline, see [`Future::then_run`].
    pub fn then_apply<U, F>(&self, f: F) -> Future<U>
    where
        T: Clone,
        U: Send + Sync + 'static,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.chain(Dispatch::Inline, move |value: &T| Ok(f(value.clone())))
    }

    /// Like [`Future::then_apply`] for continuations that can fail. An error
    /// returned by `f` fails the new future.
    pub fn then_try_apply<U, F>(&self, f: F) -> Future<U>
    where
        T: Clone,
        U: Send + Sync + 'static,
        F: FnOnce(T) -> anyhow::Result<U> + Send + 'static,
    {
        self.chain(Dispatch::Inline, move |value: &T| f(value.clone()))
    }

    /// Submits `f` to `scheduler` once this future completes successfully.
    ///
    /// If the scheduler no longer accepts tasks by then, the new future fails
    /// with [`TaskError::SchedulerClosed`].
    pub fn then_run_async<U, F>(&self, scheduler: &Handle, f: F) -> Future<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce() -> U + Send + 'static,
    {
        self.chain(Dispatch::Async(scheduler.clone()), move |_| Ok(f()))
    }

    /// Submits `f` to `scheduler` with this future's value once it completes
    /// successfully. The value is borrowed from the completed antecedent, no
    /// clone is made.
    pub fn then_apply_async<U, F>(&self, scheduler: &Handle, f: F) -> Future<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> U + Send + 'static,
    {
        self.chain(Dispatch::Async(scheduler.clone()), move |value: &T| {
            Ok(f(value))
        })
    }

    fn chain<U, F>(&self, dispatch: Dispatch, f: F) -> Future<U>
    where
        U: Send + Sync + 'static,
        F: FnOnce(&T) -> anyhow::Result<U> + Send + 'static,
    {
        let next = Future::<U>::pending(Id::next());
        let child = next.clone();

        self.core.register(Box::new(move |antecedent: &Arc<Core<T>>| {
            if let Some(Err(err)) = antecedent.observe() {
                tracing::trace!(
                    task.id = %child.id(),
                    antecedent.id = %antecedent.id,
                    "antecedent failed, skipping continuation"
                );
                child.complete(Err(err));
                return;
            }

            // The antecedent outcome is immutable from here on, the body reads
            // the value straight out of it.
            let antecedent = Arc::clone(antecedent);
            let task = Task::with_id(child.id(), move || match antecedent.outcome() {
                Some(Outcome::Completed(value)) => f(value),
                _ => Err(anyhow!("antecedent {} has no value", antecedent.id)),
            });

            match dispatch {
                Dispatch::Inline => {
                    run_task(task, &child);
                }
                Dispatch::Async(handle) => {
                    if let Err(err) = handle.dispatch(task, child.clone()) {
                        child.complete(Err(err));
                    }
                }
            }
        }));

        next
    }
}

impl<T: Send + Sync + 'static> Future<Future<T>> {
    /// Flattens a future of a future, completing once the inner future does.
    pub fn flatten(&self) -> Future<T>
    where
        T: Clone,
    {
        let next = Future::<T>::pending(Id::next());
        let child = next.clone();

        self.core.register(Box::new(move |outer: &Arc<Core<Future<T>>>| {
            let inner = match outer.observe() {
                Some(Ok(inner)) => inner.clone(),
                Some(Err(err)) => {
                    child.complete(Err(err));
                    return;
                }
                None => {
                    child.complete(Err(TaskError::cancelled(outer.id)));
                    return;
                }
            };

            inner.core.register(Box::new(move |inner: &Arc<Core<T>>| {
                let res = match inner.observe() {
                    Some(res) => res.cloned(),
                    None => Err(TaskError::cancelled(inner.id)),
                };
                child.complete(res);
            }));
        }));

        next
    }
}
