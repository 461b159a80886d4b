//! Observable scheduler state: performance counters and queue summaries.

use std::collections::BTreeMap;
use std::time::Instant;

use crate::core::task::Priority;

/// Aggregate performance counters maintained by the scheduler.
///
/// Counter fields are updated as tasks move through the lifecycle; derived
/// usage fields (`cpu_usage`, `memory_usage`, `load_factor`) are refreshed by
/// the load monitor on each tick. `current_active_threads` and
/// `current_queue_size` are computed on demand from the pool and queue when a
/// snapshot is taken, so they never drift from the real counts.
#[derive(Debug, Clone)]
pub struct PerformanceMetrics {
    /// Tasks ever accepted by `submit`.
    pub total_tasks_submitted: u64,
    /// Tasks that reached `Completed`.
    pub total_tasks_completed: u64,
    /// Tasks that reached `Failed` or `Timeout`.
    pub total_tasks_failed: u64,
    /// Mean time spent inside task functions, over the retained results.
    pub average_execution_ms: f64,
    /// Mean time from submission to execution start.
    pub average_wait_ms: f64,
    /// Workers currently inside a task function.
    pub current_active_threads: usize,
    /// Tasks currently waiting in the queue.
    pub current_queue_size: usize,
    /// Derived CPU usage in percent, `[0, 100]`.
    pub cpu_usage: f64,
    /// Derived memory usage in bytes.
    pub memory_usage: u64,
    /// Combined utilization/backlog scalar in `[0, 1]`.
    pub load_factor: f64,
    /// When any field was last refreshed.
    pub last_update: Instant,
}

impl Default for PerformanceMetrics {
    fn default() -> Self {
        Self {
            total_tasks_submitted: 0,
            total_tasks_completed: 0,
            total_tasks_failed: 0,
            average_execution_ms: 0.0,
            average_wait_ms: 0.0,
            current_active_threads: 0,
            current_queue_size: 0,
            cpu_usage: 0.0,
            memory_usage: 0,
            load_factor: 0.0,
            last_update: Instant::now(),
        }
    }
}

/// Point-in-time summary of task states and queue composition.
#[derive(Debug, Clone, Default)]
pub struct QueueStatus {
    /// Tracked tasks currently `Pending`.
    pub pending_tasks: usize,
    /// Tracked tasks currently `Running`.
    pub running_tasks: usize,
    /// Tracked tasks that reached `Completed`.
    pub completed_tasks: usize,
    /// Queued tasks per priority level; every level is present.
    pub priority_distribution: BTreeMap<Priority, usize>,
}

/// Inputs to a scaling decision, sampled on one monitor tick.
#[derive(Debug, Clone, Copy)]
pub struct LoadSnapshot {
    /// Workers currently inside a task function.
    pub active: usize,
    /// Current worker pool size.
    pub pool_size: usize,
    /// Tasks waiting in the queue.
    pub queue_size: usize,
    /// Queued tasks at `Critical` or `High` priority.
    pub urgent_queued: usize,
    /// Load factor computed for this tick.
    pub load_factor: f64,
}
