//! Per-thread work stack for continuations.
//!
//! Completing a future runs its continuations, which complete their own
//! futures, and so on down the chain. Doing that recursively costs stack
//! frames per link. Instead, the outermost completion on a thread drains a
//! thread-local stack of jobs, and nested completions only push onto it.
//! Jobs pushed by a job run as soon as it returns, before its siblings, which
//! keeps the depth-first order of plain recursion.

use crate::utils::ScopeGuard;
use std::cell::{Cell, RefCell};

pub(crate) type Job = Box<dyn FnOnce() + 'static>;

thread_local! {
    static JOBS: RefCell<Vec<Job>> = const { RefCell::new(Vec::new()) };

    static DRAINING: Cell<bool> = const { Cell::new(false) };
}

/// Runs `jobs` in order on the current thread.
///
/// If the thread is already draining, the jobs are queued and run once the
/// current job returns.
pub(crate) fn run<I>(jobs: I)
where
    I: DoubleEndedIterator<Item = Job>,
{
    let mut jobs = Some(jobs);
    let pushed = JOBS
        .try_with(|stack| {
            if let Some(jobs) = jobs.take() {
                stack.borrow_mut().extend(jobs.rev());
            }
        })
        .is_ok();

    // Thread-local storage is gone, the thread is exiting.
    if !pushed {
        jobs.into_iter().flatten().for_each(|job| job());
        return;
    }

    if DRAINING.get() {
        return;
    }

    DRAINING.set(true);
    let _guard = ScopeGuard::new(|| DRAINING.set(false));
    drain();
}

/// Runs every queued job if the thread is draining. Called before blocking,
/// the awaited future may be completed by one of them.
pub(crate) fn help() {
    if DRAINING.try_with(Cell::get).unwrap_or(false) {
        drain();
    }
}

fn drain() {
    while let Some(job) = JOBS.with_borrow_mut(Vec::pop) {
        job();
    }
}

#[cfg(test)]
pub(crate) fn is_idle() -> bool {
    !DRAINING.get() && JOBS.with_borrow(Vec::is_empty)
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::rc::Rc;
    use std::sync::Arc;

    fn job(f: impl FnOnce() + 'static) -> Job {
        Box::new(f)
    }

    #[test]
    fn test_nested_jobs_run_depth_first() {
        let order = Arc::new(Mutex::new(Vec::new()));

        let (o1, o2, o3) = (Arc::clone(&order), Arc::clone(&order), Arc::clone(&order));
        run(vec![
            job(move || {
                o1.lock().push("a");
                let child = Arc::clone(&o1);
                run(vec![job(move || child.lock().push("a.child"))].into_iter());
                // Deferred until this job returns.
                assert_eq!(o1.lock().last(), Some(&"a"));
            }),
            job(move || o2.lock().push("b")),
        ]
        .into_iter());
        run(vec![job(move || o3.lock().push("c"))].into_iter());

        assert_eq!(*order.lock(), vec!["a", "a.child", "b", "c"]);
        assert!(is_idle());
    }

    #[test]
    fn test_deep_nesting_uses_constant_stack() {
        fn link(remaining: usize, count: Rc<Cell<usize>>) -> Job {
            Box::new(move || {
                count.set(count.get() + 1);
                if remaining > 0 {
                    run(std::iter::once(link(remaining - 1, count)));
                }
            })
        }

        let count = Rc::new(Cell::new(0));
        run(std::iter::once(link(200_000, Rc::clone(&count))));

        assert_eq!(count.get(), 200_001);
        assert!(is_idle());
    }

    #[test]
    fn test_help_runs_queued_jobs() {
        let ran = Rc::new(Cell::new(false));
        let r = Rc::clone(&ran);

        run(std::iter::once(job(move || {
            let r2 = Rc::clone(&r);
            run(std::iter::once(job(move || r2.set(true))));
            assert!(!r.get());
            help();
            assert!(r.get());
        })));

        assert!(ran.get());
    }

    #[test]
    fn test_draining_flag_reset_on_panic() {
        let res = std::panic::catch_unwind(|| {
            run(std::iter::once(job(|| panic!("job failed"))));
        });

        assert!(res.is_err());
        assert!(is_idle());
    }
}
