use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, Thread};

#[derive(Debug)]
struct ParkedThread {
    thread: Thread,
    should_unpark: Arc<AtomicBool>,
}

/// Parking lot for idle workers.
#[derive(Debug)]
pub(crate) struct Shared {
    /// LIFO collection of parked threads. We unpark thread in LIFO order as the
    /// latest parked thread is the one where CPU cache will be the hotest.
    parked_threads: RwLock<VecDeque<ParkedThread>>,
}

impl Shared {
    pub(crate) fn new(num_workers: usize) -> Self {
        Self {
            parked_threads: RwLock::new(VecDeque::with_capacity(num_workers)),
        }
    }

    /// Parks the current thread until a submitter or shutdown unparks it.
    ///
    /// `stay_awake` is evaluated *while holding the lock*: a submitter pushes
    /// work before taking the same lock to unpark, so either we see the new
    /// work here or the submitter sees us in the parked list.
    #[track_caller]
    pub(crate) fn park_current_thread(
        &self,
        should_unpark: &Arc<AtomicBool>,
        stay_awake: impl FnOnce() -> bool,
    ) {
        {
            let mut parked_threads = self.parked_threads.write();

            if stay_awake() {
                return;
            }

            should_unpark.store(false, Ordering::Release);
            parked_threads.push_back(ParkedThread {
                thread: thread::current(),
                should_unpark: Arc::clone(should_unpark),
            });
        }

        // Release lock and spin until it is time to unpark. We use this loop to
        // account for spurious wakeups as per docs.
        while !should_unpark.load(Ordering::Acquire) {
            thread::park();
        }
    }

    #[track_caller]
    pub(crate) fn unpark_one_thread(&self) -> bool {
        if let Some(parked) = self.parked_threads.write().pop_back() {
            parked.should_unpark.store(true, Ordering::Release);
            parked.thread.unpark();
            true
        } else {
            false
        }
    }

    #[track_caller]
    pub(crate) fn unpark_all_threads(&self) -> usize {
        let mut num_unparked = 0;
        let mut parked_threads = self.parked_threads.write();

        while let Some(parked) = parked_threads.pop_back() {
            num_unparked += 1;
            parked.should_unpark.store(true, Ordering::Release);
            parked.thread.unpark();
        }

        num_unparked
    }

    #[cfg(test)]
    pub(crate) fn num_parked(&self) -> usize {
        self.parked_threads.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use static_assertions::assert_impl_all;
    use std::time::{Duration, Instant};

    assert_impl_all!(Shared: Send, Sync);

    #[test]
    fn test_stay_awake_skips_parking() {
        let shared = Shared::new(1);
        let flag = Arc::new(AtomicBool::new(false));

        shared.park_current_thread(&flag, || true);
        assert_eq!(shared.num_parked(), 0);
    }

    #[test]
    fn test_park_then_unpark_one() {
        let shared = Arc::new(Shared::new(1));

        let parker = {
            let shared = Arc::clone(&shared);
            thread::spawn(move || {
                let flag = Arc::new(AtomicBool::new(false));
                shared.park_current_thread(&flag, || false);
            })
        };

        let start = Instant::now();
        while shared.num_parked() == 0 {
            assert!(start.elapsed() < Duration::from_secs(5), "thread never parked");
            thread::yield_now();
        }

        assert!(shared.unpark_one_thread());
        parker.join().expect("parked thread panicked");
        assert!(!shared.unpark_one_thread());
    }
}
