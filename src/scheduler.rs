//! Scheduler facade: submission, cancellation, queries, and lifecycle.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::{SchedulerConfig, ScalingStrategy};
use crate::core::error::SchedulerError;
use crate::core::metrics::{PerformanceMetrics, QueueStatus};
use crate::core::monitor;
use crate::core::pool::{WorkerEngine, WorkerPool, WorkerVerdict};
use crate::core::probe::{DerivedProbe, ResourceProbe};
use crate::core::queue::PriorityQueue;
use crate::core::registry::TaskRegistry;
use crate::core::task::{
    ResultStatus, Task, TaskId, TaskResult, TaskStatus, INVALID_TASK_ID,
};
use crate::core::watchdog;

/// Delay giving in-flight tasks a chance to finish before the queue stops.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(200);

/// Bounded wait used by workers when polling the queue.
const POP_WAIT: Duration = Duration::from_millis(100);

/// Backoff used by workers while scheduling is paused.
const PAUSE_BACKOFF: Duration = Duration::from_millis(20);

/// Shared state driven by workers, the watchdog, and the monitor.
pub(crate) struct SchedulerCore {
    pub(crate) config: RwLock<SchedulerConfig>,
    pub(crate) queue: PriorityQueue,
    pub(crate) registry: TaskRegistry,
    pub(crate) pool: WorkerPool,
    pub(crate) probe: Box<dyn ResourceProbe>,
    pub(crate) running: AtomicBool,
    pub(crate) paused: AtomicBool,
    pub(crate) resource_paused: AtomicBool,
    pub(crate) resource_exceeded: AtomicBool,
    pub(crate) autoscaling_enabled: AtomicBool,
    pub(crate) last_scaling_action: Mutex<Option<Instant>>,
}

impl SchedulerCore {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            config: RwLock::new(config),
            queue: PriorityQueue::new(),
            registry: TaskRegistry::new(),
            pool: WorkerPool::new(),
            probe: Box::new(DerivedProbe),
            running: AtomicBool::new(false),
            paused: AtomicBool::new(false),
            resource_paused: AtomicBool::new(false),
            resource_exceeded: AtomicBool::new(false),
            autoscaling_enabled: AtomicBool::new(true),
            last_scaling_action: Mutex::new(None),
        }
    }

    /// Quiesce: stop the queue so workers idle and submissions are refused.
    pub(crate) fn pause(&self) {
        self.paused.store(true, Ordering::Release);
        self.queue.stop();
        info!("scheduling paused");
    }

    /// Undo [`pause`](Self::pause).
    pub(crate) fn resume(&self) {
        self.paused.store(false, Ordering::Release);
        self.queue.resume();
        info!("scheduling resumed");
    }

    /// Run one task to completion and commit its result.
    fn execute(&self, task: Arc<Task>) {
        if !self.registry.mark_running(task.id) {
            // Cancelled or timed out while queued; nothing to run.
            debug!(task_id = task.id, "skipping task no longer pending");
            return;
        }
        let _active = self.pool.active_guard();
        let started = Instant::now();
        let call = catch_unwind(AssertUnwindSafe(|| (task.function)()));
        let finished = Instant::now();
        let execution_time = finished.duration_since(started);

        let (status, result) = match call {
            Ok(outcome) if outcome.status == ResultStatus::Success => (
                TaskStatus::Completed,
                TaskResult {
                    task_id: task.id,
                    status: ResultStatus::Success,
                    result: outcome.value,
                    error_message: String::new(),
                    execution_time,
                    completion_time: finished,
                },
            ),
            Ok(outcome) => (
                TaskStatus::Failed,
                TaskResult {
                    task_id: task.id,
                    status: ResultStatus::Failure,
                    result: outcome.value,
                    error_message: if outcome.error.is_empty() {
                        "task reported failure".to_string()
                    } else {
                        outcome.error
                    },
                    execution_time,
                    completion_time: finished,
                },
            ),
            Err(payload) => (
                TaskStatus::Failed,
                TaskResult {
                    task_id: task.id,
                    status: ResultStatus::Failure,
                    result: Value::Null,
                    error_message: panic_message(payload.as_ref()),
                    execution_time,
                    completion_time: finished,
                },
            ),
        };

        if !self.registry.commit(task.id, status, result) {
            // The watchdog won the race; the late return is discarded.
            debug!(task_id = task.id, "result discarded, task already terminal");
        }
    }
}

impl WorkerEngine for SchedulerCore {
    fn cycle(&self) -> WorkerVerdict {
        if !self.running.load(Ordering::Acquire) {
            return WorkerVerdict::Exit;
        }
        if self.paused.load(Ordering::Acquire) {
            thread::sleep(PAUSE_BACKOFF);
            return WorkerVerdict::Idled;
        }
        match self.queue.pop_with_timeout(POP_WAIT) {
            Some(task) => {
                self.execute(task);
                WorkerVerdict::Worked
            }
            None => WorkerVerdict::Idled,
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic in task function".to_string()
    }
}

/// In-process priority task scheduler.
///
/// Accepts units of work, queues them by priority, dispatches them onto an
/// elastic pool of worker threads, enforces per-task timeouts, and autoscales
/// the pool from observed load. See the crate docs for an end-to-end example.
///
/// All methods take `&self`; the scheduler is intended to be shared behind an
/// `Arc` or borrowed across threads. Operational failures are reported as
/// sentinels: `submit` returns [`INVALID_TASK_ID`], `cancel` returns `false`,
/// and unknown ids read as `Cancelled`.
pub struct TaskScheduler {
    core: Arc<SchedulerCore>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl TaskScheduler {
    /// Create a scheduler with the default configuration. No threads start
    /// until [`start`](Self::start) or [`initialize`](Self::initialize).
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(SchedulerConfig::default())
    }

    /// Create a scheduler with the given configuration.
    #[must_use]
    pub fn with_config(config: SchedulerConfig) -> Self {
        Self {
            core: Arc::new(SchedulerCore::new(config)),
            watchdog: Mutex::new(None),
            monitor: Mutex::new(None),
        }
    }

    /// Start the scheduler with the configuration supplied at construction.
    ///
    /// # Errors
    ///
    /// `SchedulerError::AlreadyRunning` if the scheduler is running;
    /// `SchedulerError::InvalidConfig` if the stored configuration fails
    /// validation. Neither has side effects.
    pub fn start(&self) -> Result<(), SchedulerError> {
        let config = self.core.config.read().clone();
        self.spin_up(config)
    }

    /// Start the scheduler with `config`, replacing the stored configuration.
    ///
    /// # Errors
    ///
    /// Same contract as [`start`](Self::start).
    pub fn initialize(&self, config: SchedulerConfig) -> Result<(), SchedulerError> {
        self.spin_up(config)
    }

    fn spin_up(&self, config: SchedulerConfig) -> Result<(), SchedulerError> {
        config.validate()?;
        if self
            .core
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(SchedulerError::AlreadyRunning);
        }

        *self.core.config.write() = config.clone();
        self.core.paused.store(false, Ordering::Release);
        self.core.resource_paused.store(false, Ordering::Release);
        self.core.resource_exceeded.store(false, Ordering::Release);
        self.core.queue.resume();
        *self.core.last_scaling_action.lock() = None;

        let engine: Arc<dyn WorkerEngine> = self.core.clone();
        self.core.pool.attach_engine(&engine);
        self.core.pool.spawn_workers(config.min_threads);
        // Bootstrap marker runs through the pool's internal job lane.
        let workers = config.min_threads;
        self.core.pool.submit_job(move || {
            debug!(workers, "worker pool bootstrapped");
        });

        let watchdog_core = Arc::clone(&self.core);
        *self.watchdog.lock() = Some(
            thread::Builder::new()
                .name("taskmill-watchdog".into())
                .spawn(move || watchdog::run(watchdog_core))
                .expect("failed to spawn watchdog thread"),
        );
        let monitor_core = Arc::clone(&self.core);
        *self.monitor.lock() = Some(
            thread::Builder::new()
                .name("taskmill-monitor".into())
                .spawn(move || monitor::run(monitor_core))
                .expect("failed to spawn monitor thread"),
        );

        info!(
            min_threads = config.min_threads,
            max_threads = config.max_threads,
            strategy = ?config.strategy,
            "scheduler started"
        );
        Ok(())
    }

    /// Submit a task for execution.
    ///
    /// Returns the assigned id, observable through
    /// [`task_status`](Self::task_status) from the moment this returns, or
    /// [`INVALID_TASK_ID`] if the scheduler is not running or is paused.
    pub fn submit(&self, mut task: Task) -> TaskId {
        if !self.core.running.load(Ordering::Acquire) || self.core.paused.load(Ordering::Acquire) {
            return INVALID_TASK_ID;
        }
        if task.timeout.is_none() {
            task.timeout = Some(self.core.config.read().default_timeout());
        }
        let (id, task) = self.core.registry.insert_pending(task);
        match self.core.queue.push(task) {
            Ok(()) => {
                debug!(task_id = id, "task submitted");
                id
            }
            Err(_) => {
                // The queue stopped between the paused check and the push.
                self.core.registry.cancel_if_pending(id);
                warn!(task_id = id, "submission rejected, queue stopped");
                INVALID_TASK_ID
            }
        }
    }

    /// Cancel a pending task.
    ///
    /// Succeeds only while the task is still `Pending` and queued; a running
    /// or finished task is left untouched and `false` is returned.
    pub fn cancel(&self, id: TaskId) -> bool {
        if id == INVALID_TASK_ID || !self.core.queue.remove(id) {
            return false;
        }
        if self.core.registry.cancel_if_pending(id) {
            debug!(task_id = id, "task cancelled");
            true
        } else {
            false
        }
    }

    /// Current lifecycle state of a task. Unknown ids read as `Cancelled`.
    #[must_use]
    pub fn task_status(&self, id: TaskId) -> TaskStatus {
        self.core
            .registry
            .status(id)
            .unwrap_or(TaskStatus::Cancelled)
    }

    /// Snapshot of the retained terminal results, oldest first.
    #[must_use]
    pub fn completed_tasks(&self) -> Vec<TaskResult> {
        self.core.registry.snapshot_results()
    }

    /// Discard the retained terminal results.
    pub fn clear_completed_tasks(&self) {
        self.core.registry.clear_results();
    }

    /// Clone of the current configuration.
    #[must_use]
    pub fn config(&self) -> SchedulerConfig {
        self.core.config.read().clone()
    }

    /// Replace the configuration. If the scheduler is running and the pool
    /// now falls outside `[min_threads, max_threads]`, it is resized into
    /// range.
    ///
    /// # Errors
    ///
    /// `SchedulerError::InvalidConfig` if validation fails; the previous
    /// configuration is kept.
    pub fn update_config(&self, config: SchedulerConfig) -> Result<(), SchedulerError> {
        config.validate()?;
        let (min_threads, max_threads) = (config.min_threads, config.max_threads);
        *self.core.config.write() = config;
        if self.core.running.load(Ordering::Acquire) {
            let size = self.core.pool.pool_size();
            let clamped = size.clamp(min_threads, max_threads);
            if clamped != size {
                self.core.pool.resize(clamped);
            }
        }
        Ok(())
    }

    /// Quiesce the scheduler: stop dequeuing and reject new submissions.
    pub fn pause_scheduling(&self) {
        self.core.pause();
    }

    /// Resume after [`pause_scheduling`](Self::pause_scheduling).
    pub fn resume_scheduling(&self) {
        self.core.resource_paused.store(false, Ordering::Release);
        self.core.resume();
    }

    /// True while paused, whether by a caller or by a resource ceiling.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.core.paused.load(Ordering::Acquire)
    }

    /// True between a successful start and `shutdown`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Snapshot of the performance counters, with the live pool and queue
    /// occupancy filled in.
    #[must_use]
    pub fn performance_metrics(&self) -> PerformanceMetrics {
        let mut metrics = self.core.registry.metrics_snapshot();
        metrics.current_active_threads = self.core.pool.active_count();
        metrics.current_queue_size = self.core.queue.len();
        metrics
    }

    /// Task-state counts plus the queued-priority distribution.
    #[must_use]
    pub fn queue_status(&self) -> QueueStatus {
        let mut status = self.core.registry.summary();
        status.priority_distribution = self.core.queue.priority_distribution();
        status
    }

    /// Latest derived CPU usage sample, in percent.
    #[must_use]
    pub fn current_cpu_usage(&self) -> f64 {
        self.core.registry.metrics_snapshot().cpu_usage
    }

    /// Latest derived memory usage sample, in bytes.
    #[must_use]
    pub fn current_memory_usage(&self) -> u64 {
        self.core.registry.metrics_snapshot().memory_usage
    }

    /// Latest load factor sample, in `[0, 1]`.
    #[must_use]
    pub fn load_factor(&self) -> f64 {
        self.core.registry.metrics_snapshot().load_factor
    }

    /// True while any resource ceiling is crossed.
    #[must_use]
    pub fn is_resource_limit_exceeded(&self) -> bool {
        self.core.resource_exceeded.load(Ordering::Acquire)
    }

    /// Change the scaling policy at runtime.
    pub fn set_strategy(&self, strategy: ScalingStrategy) {
        self.core.config.write().strategy = strategy;
    }

    /// Replace the resource ceilings at runtime.
    pub fn set_resource_limits(&self, limits: crate::config::ResourceLimits) {
        self.core.config.write().resource_limits = limits;
    }

    /// Replace the autoscaler tuning at runtime.
    pub fn set_load_balancing_config(&self, config: crate::config::LoadBalancingConfig) {
        self.core.config.write().load_balancing = config;
    }

    /// Enable or disable autoscaling without touching the configuration.
    pub fn set_autoscaling_enabled(&self, enabled: bool) {
        self.core
            .autoscaling_enabled
            .store(enabled, Ordering::Release);
    }

    /// Manually resize the worker pool; the target is clamped to
    /// `[min_threads, max_threads]`.
    pub fn adjust_pool_size(&self, target: usize) {
        if !self.core.running.load(Ordering::Acquire) {
            return;
        }
        let (min_threads, max_threads) = {
            let config = self.core.config.read();
            (config.min_threads, config.max_threads)
        };
        let clamped = target.clamp(min_threads, max_threads);
        info!(target = clamped, "adjusting worker pool size");
        self.core.pool.resize(clamped);
    }

    /// Current worker pool size.
    #[must_use]
    pub fn pool_size(&self) -> usize {
        self.core.pool.pool_size()
    }

    /// One-line-per-item status summary for diagnostics.
    #[must_use]
    pub fn status_report(&self) -> Vec<String> {
        let metrics = self.performance_metrics();
        vec![
            format!("running: {}", self.is_running()),
            format!("paused: {}", self.is_paused()),
            format!("pool size: {}", self.pool_size()),
            format!("active threads: {}", metrics.current_active_threads),
            format!("queue size: {}", metrics.current_queue_size),
            format!("tasks submitted: {}", metrics.total_tasks_submitted),
            format!("tasks completed: {}", metrics.total_tasks_completed),
            format!("tasks failed: {}", metrics.total_tasks_failed),
        ]
    }

    /// Stop the scheduler and release every thread. Idempotent.
    ///
    /// Workers finish the task they are executing; tasks still queued are
    /// abandoned as `Cancelled`. Returns once the worker pool, watchdog, and
    /// monitor have been joined and the registry cleared, bounded by the
    /// longest currently-running task plus a small constant.
    pub fn shutdown(&self) {
        if !self.core.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("scheduler shutting down");
        thread::sleep(SHUTDOWN_GRACE);
        self.core.queue.stop();
        self.core.pool.stop();
        if let Some(handle) = self.watchdog.lock().take() {
            let _ = handle.join();
        }
        if let Some(handle) = self.monitor.lock().take() {
            let _ = handle.join();
        }
        let abandoned = self.core.registry.abandon_pending();
        if abandoned > 0 {
            warn!(abandoned, "pending tasks abandoned at shutdown");
        }
        self.core.queue.clear();
        self.core.registry.clear();
        info!("scheduler shut down");
    }
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for TaskScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}
