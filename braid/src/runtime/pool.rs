use crate::context::{self, WorkerContext};
use crate::runtime::scheduler::Inner;
use crate::runtime::trace::{Tracer, WorkerId};
use crate::runtime::worker::Worker;
use anyhow::{Context, Result, anyhow};
use crossbeam_deque::Worker as CbWorker;
use parking_lot::Mutex;
use std::sync::{Arc, mpsc};
use std::thread;

/// Worker threads of a scheduler.
#[derive(Debug)]
pub(super) struct ThreadPool {
    handles: Mutex<Vec<thread::JoinHandle<()>>>,
}

impl ThreadPool {
    /// Spawns one thread per configured worker, and returns once all of them
    /// are running their event loop.
    pub(super) fn spawn(inner: &Arc<Inner>) -> Result<Self> {
        let num_workers = inner.cfg.worker_threads;

        // Create Crossbeam FIFO queues and their stealers. Tasks are
        // independent, FIFO keeps submission order as much as possible.
        let mut local_queues = Vec::with_capacity(num_workers);
        let mut stealers = Vec::with_capacity(num_workers);

        for _ in 0..num_workers {
            let w = CbWorker::new_fifo();
            stealers.push(w.stealer());
            local_queues.push(w);
        }

        let workers = local_queues
            .into_iter()
            .enumerate()
            .map(|(i, local_queue)| {
                // Give each worker a list of all *other* workers' stealers
                let other_stealers = stealers
                    .iter()
                    .enumerate()
                    .filter(|(j, _)| *j != i)
                    .map(|(_, s)| s.clone())
                    .collect::<Vec<_>>();

                Worker::new(i, Arc::clone(inner), local_queue, other_stealers)
            })
            .collect::<Vec<_>>();

        // Each thread signals once it is initialized. Unlike a barrier, the
        // channel does not hang if a thread fails to spawn halfway through.
        let (ready_tx, ready_rx) = mpsc::channel();
        let pool = ThreadPool {
            handles: Mutex::new(Vec::with_capacity(num_workers)),
        };

        for worker in workers {
            match spawn_worker_thread(inner, worker, ready_tx.clone()) {
                Ok(handle) => pool.handles.lock().push(handle),
                Err(e) => return Err(pool.abort(inner, e)),
            }
        }

        drop(ready_tx);

        // Spawning threads is async, wait for all threads to be started...
        for _ in 0..num_workers {
            if ready_rx.recv().is_err() {
                return Err(pool.abort(inner, anyhow!("worker thread exited during startup")));
            }
        }

        Ok(pool)
    }

    /// Stops the workers started so far. They hold a reference to `inner`
    /// and would otherwise park forever.
    fn abort(&self, inner: &Inner, err: anyhow::Error) -> anyhow::Error {
        inner.abort();
        inner.shared.unpark_all_threads();

        match self.join_all() {
            Ok(()) => err,
            Err(join_err) => err.context(join_err),
        }
    }

    pub(super) fn join_all(&self) -> Result<()> {
        let mut handles = self.handles.lock();

        let errors = handles
            .drain(..)
            .filter_map(|handle| {
                let name = handle.thread().name().map(str::to_owned);
                handle.join().err().map(|_| name)
            })
            .collect::<Vec<_>>();

        if errors.is_empty() {
            Ok(())
        } else {
            tracing::error!(threads = ?errors, "worker thread(s) panicked");
            Err(anyhow!("{} thread(s) panicked", errors.len()))
        }
    }
}

fn spawn_worker_thread(
    inner: &Arc<Inner>,
    worker: Worker,
    ready: mpsc::Sender<()>,
) -> Result<thread::JoinHandle<()>> {
    let mut builder = thread::Builder::new();

    if let Some(stack_size) = inner.cfg.thread_stack_size {
        builder = builder.stack_size(stack_size);
    }

    let name = (inner.cfg.thread_name.0)();
    let tracer = Tracer::new(
        WorkerId::new(worker.index(), name.as_str()),
        inner.cfg.trace_hook.clone(),
    );
    let scheduler_id = inner.id;

    builder
        .name(name)
        .spawn(move || {
            context::init_worker_context(WorkerContext {
                scheduler_id,
                tracer,
            });
            // The spawning thread may be gone already if a sibling failed.
            let _ = ready.send(());

            worker.event_loop();
        })
        .context("failed to spawn worker thread")
}
