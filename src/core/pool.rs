//! Worker pool: dedicated OS threads driving the scheduling engine.
//!
//! The pool owns thread lifecycle only; what a worker does each iteration is
//! supplied through the [`WorkerEngine`] seam. Growth spawns threads
//! immediately; shrinking bumps a retire counter that idle workers consume
//! between tasks. A crossbeam channel carries one-shot internal jobs that
//! workers drain ahead of regular scheduling work.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use parking_lot::Mutex;
use tracing::{debug, info, warn};

/// One-shot internal job, e.g. a bootstrap or maintenance step.
pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

/// What a worker observed during one engine iteration.
pub(crate) enum WorkerVerdict {
    /// A task was executed.
    Worked,
    /// Nothing to do right now.
    Idled,
    /// The engine is draining; the worker thread should exit.
    Exit,
}

/// One iteration of the scheduling loop, implemented by the scheduler core.
pub(crate) trait WorkerEngine: Send + Sync + 'static {
    fn cycle(&self) -> WorkerVerdict;
}

/// Counters shared between the pool handle and its worker threads.
struct PoolShared {
    size: AtomicUsize,
    active: AtomicUsize,
    retiring: AtomicUsize,
    stopped: AtomicBool,
}

impl PoolShared {
    /// Consume one pending retirement, if any.
    fn take_retirement(&self) -> bool {
        self.retiring
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |r| r.checked_sub(1))
            .is_ok()
    }
}

/// RAII marker for a worker executing a user task.
pub(crate) struct ActiveGuard {
    shared: Arc<PoolShared>,
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.shared.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Elastic pool of worker threads.
pub(crate) struct WorkerPool {
    shared: Arc<PoolShared>,
    engine: Mutex<Option<Weak<dyn WorkerEngine>>>,
    injected_tx: Sender<Job>,
    injected_rx: Receiver<Job>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    next_worker_id: AtomicUsize,
}

impl WorkerPool {
    /// Create an empty, unstarted pool.
    pub(crate) fn new() -> Self {
        let (injected_tx, injected_rx) = unbounded();
        Self {
            shared: Arc::new(PoolShared {
                size: AtomicUsize::new(0),
                active: AtomicUsize::new(0),
                retiring: AtomicUsize::new(0),
                stopped: AtomicBool::new(false),
            }),
            engine: Mutex::new(None),
            injected_tx,
            injected_rx,
            workers: Mutex::new(Vec::new()),
            next_worker_id: AtomicUsize::new(0),
        }
    }

    /// Attach the engine workers will drive. Must be called before workers
    /// are spawned; the pool holds only a weak handle so that dropping the
    /// scheduler lets workers wind down.
    pub(crate) fn attach_engine(&self, engine: &Arc<dyn WorkerEngine>) {
        *self.engine.lock() = Some(Arc::downgrade(engine));
        self.shared.stopped.store(false, Ordering::SeqCst);
    }

    /// Spawn `count` additional workers.
    pub(crate) fn spawn_workers(&self, count: usize) {
        let Some(engine) = self.engine.lock().clone() else {
            warn!("cannot spawn workers before an engine is attached");
            return;
        };
        for _ in 0..count {
            self.spawn_one(engine.clone());
        }
    }

    fn spawn_one(&self, engine: Weak<dyn WorkerEngine>) {
        let worker_id = self.next_worker_id.fetch_add(1, Ordering::Relaxed);
        let shared = Arc::clone(&self.shared);
        let injected = self.injected_rx.clone();
        shared.size.fetch_add(1, Ordering::SeqCst);
        let handle = thread::Builder::new()
            .name(format!("taskmill-worker-{worker_id}"))
            .spawn(move || {
                debug!(worker_id, "worker thread started");
                worker_loop(worker_id, &shared, &injected, &engine);
                shared.size.fetch_sub(1, Ordering::SeqCst);
                debug!(worker_id, "worker thread exiting");
            })
            .expect("failed to spawn worker thread");
        self.workers.lock().push(handle);
    }

    /// Grow or shrink toward `target` workers. Shrinking takes effect as
    /// workers finish their current task and observe the retire counter.
    pub(crate) fn resize(&self, target: usize) {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return;
        }
        let current = self.pool_size();
        if target > current {
            self.spawn_workers(target - current);
        } else if target < current {
            self.shared
                .retiring
                .fetch_add(current - target, Ordering::SeqCst);
        }
    }

    /// Effective pool size: live threads minus pending retirements.
    pub(crate) fn pool_size(&self) -> usize {
        self.shared
            .size
            .load(Ordering::SeqCst)
            .saturating_sub(self.shared.retiring.load(Ordering::SeqCst))
    }

    /// Workers currently inside a user task function.
    pub(crate) fn active_count(&self) -> usize {
        self.shared.active.load(Ordering::SeqCst)
    }

    /// Mark the calling worker as executing a user task for the guard's
    /// lifetime.
    pub(crate) fn active_guard(&self) -> ActiveGuard {
        self.shared.active.fetch_add(1, Ordering::SeqCst);
        ActiveGuard {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue a one-shot internal job ahead of regular scheduling work.
    /// Returns false if the pool is stopped.
    pub(crate) fn submit_job<F>(&self, job: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.shared.stopped.load(Ordering::SeqCst) {
            return false;
        }
        self.injected_tx.send(Box::new(job)).is_ok()
    }

    /// True once `stop` has been called.
    pub(crate) fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Stop the pool and join every worker, allowing each two seconds before
    /// it is detached. Idempotent.
    pub(crate) fn stop(&self) {
        if self.shared.stopped.swap(true, Ordering::SeqCst) {
            return;
        }
        let mut workers = self.workers.lock();
        let worker_count = workers.len();
        for handle in workers.drain(..) {
            let (done_tx, done_rx) = bounded::<bool>(1);
            let joiner = thread::spawn(move || {
                let clean = handle.join().is_ok();
                let _ = done_tx.send(clean);
            });
            match done_rx.recv_timeout(Duration::from_secs(2)) {
                Ok(true) => {
                    let _ = joiner.join();
                }
                Ok(false) => {
                    warn!("worker panicked before shutdown");
                    let _ = joiner.join();
                }
                Err(_) => {
                    // Leave the joiner detached rather than hang shutdown on a
                    // stuck user function.
                    warn!("worker did not exit within timeout, detaching");
                }
            }
        }
        info!(worker_count, "worker pool stopped");
    }
}

fn worker_loop(
    worker_id: usize,
    shared: &Arc<PoolShared>,
    injected: &Receiver<Job>,
    engine: &Weak<dyn WorkerEngine>,
) {
    loop {
        while let Ok(job) = injected.try_recv() {
            job();
        }
        if shared.stopped.load(Ordering::SeqCst) {
            break;
        }
        if shared.take_retirement() {
            debug!(worker_id, "worker retiring");
            break;
        }
        let Some(engine) = engine.upgrade() else {
            break;
        };
        match engine.cycle() {
            WorkerVerdict::Worked | WorkerVerdict::Idled => {}
            WorkerVerdict::Exit => break,
        }
    }
}
