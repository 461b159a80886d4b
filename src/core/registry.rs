//! Central store of task lifecycle state and completed results.
//!
//! The registry owns id issuance, the `{id -> status}` and `{id -> task}`
//! tables, the bounded completed-results buffer, and the performance
//! counters. Two locks guard it: the status lock and the results lock. When
//! both are needed the status lock is taken first; the queue lock is never
//! held across a registry call.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

use crate::core::metrics::{PerformanceMetrics, QueueStatus};
use crate::core::task::{Task, TaskId, TaskResult, TaskStatus};

/// Default bound on the completed-results buffer.
pub const RESULT_BUFFER_CAPACITY: usize = 1000;

struct StatusTable {
    statuses: HashMap<TaskId, TaskStatus>,
    tasks: HashMap<TaskId, Arc<Task>>,
}

struct ResultsTable {
    buffer: VecDeque<TaskResult>,
    metrics: PerformanceMetrics,
    wait_total_ms: f64,
    wait_samples: u64,
}

/// A task the watchdog found past its time budget.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Overdue {
    pub id: TaskId,
    pub kind: OverdueKind,
}

/// Which budget an overdue task exceeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum OverdueKind {
    /// A running task exceeded its execution timeout.
    Execution,
    /// A pending task sat in the queue for too long.
    Waiting,
}

impl OverdueKind {
    pub(crate) fn message(self) -> &'static str {
        match self {
            OverdueKind::Execution => "Task execution timeout",
            OverdueKind::Waiting => "Task waiting timeout",
        }
    }
}

/// Lifecycle and result store shared by the scheduler's threads.
pub struct TaskRegistry {
    next_id: AtomicU64,
    status: Mutex<StatusTable>,
    results: Mutex<ResultsTable>,
    capacity: usize,
}

impl TaskRegistry {
    /// Create a registry with the default results-buffer capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(RESULT_BUFFER_CAPACITY)
    }

    /// Create a registry retaining at most `capacity` result records.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            next_id: AtomicU64::new(1),
            status: Mutex::new(StatusTable {
                statuses: HashMap::new(),
                tasks: HashMap::new(),
            }),
            results: Mutex::new(ResultsTable {
                buffer: VecDeque::new(),
                metrics: PerformanceMetrics::default(),
                wait_total_ms: 0.0,
                wait_samples: 0,
            }),
            capacity,
        }
    }

    /// Assign the next id to `task`, stamp its submission time, and track it
    /// as `Pending`. Returns the id and the shared task handle.
    pub fn insert_pending(&self, mut task: Task) -> (TaskId, Arc<Task>) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        task.id = id;
        task.submit_time = Instant::now();
        let task = Arc::new(task);
        {
            let mut table = self.status.lock();
            table.statuses.insert(id, TaskStatus::Pending);
            table.tasks.insert(id, Arc::clone(&task));
        }
        self.results.lock().metrics.total_tasks_submitted += 1;
        (id, task)
    }

    /// Transition `Pending -> Running`. Returns false if the task is unknown
    /// or no longer pending, in which case the caller must not run it.
    pub fn mark_running(&self, id: TaskId) -> bool {
        let waited_ms;
        {
            let mut table = self.status.lock();
            let StatusTable { statuses, tasks } = &mut *table;
            match statuses.get_mut(&id) {
                Some(status) if *status == TaskStatus::Pending => {
                    *status = TaskStatus::Running;
                    waited_ms = tasks
                        .get(&id)
                        .map(|t| t.submit_time.elapsed().as_secs_f64() * 1000.0);
                }
                _ => return false,
            }
        }
        if let Some(ms) = waited_ms {
            let mut results = self.results.lock();
            results.wait_total_ms += ms;
            results.wait_samples += 1;
            results.metrics.average_wait_ms = results.wait_total_ms / results.wait_samples as f64;
        }
        true
    }

    /// Commit a terminal state and its result record.
    ///
    /// The first terminal commit for an id wins; later commits return false
    /// and record nothing, so exactly one result is retained per task.
    pub fn commit(&self, id: TaskId, status: TaskStatus, result: TaskResult) -> bool {
        debug_assert!(status.is_terminal());
        {
            let mut table = self.status.lock();
            let Some(current) = table.statuses.get_mut(&id) else {
                return false;
            };
            if current.is_terminal() {
                return false;
            }
            *current = status;
            table.tasks.remove(&id);
        }
        let mut results = self.results.lock();
        if results.buffer.len() >= self.capacity {
            results.buffer.pop_front();
        }
        results.buffer.push_back(result);
        if status == TaskStatus::Completed {
            results.metrics.total_tasks_completed += 1;
        } else {
            results.metrics.total_tasks_failed += 1;
        }
        true
    }

    /// Transition `Pending -> Cancelled` and drop the task record. No result
    /// record is produced for a cancellation.
    pub fn cancel_if_pending(&self, id: TaskId) -> bool {
        let mut table = self.status.lock();
        match table.statuses.get_mut(&id) {
            Some(status) if *status == TaskStatus::Pending => {
                *status = TaskStatus::Cancelled;
                table.tasks.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Current status of a task, or `None` if the id was never issued or the
    /// registry has been cleared.
    #[must_use]
    pub fn status(&self, id: TaskId) -> Option<TaskStatus> {
        self.status.lock().statuses.get(&id).copied()
    }

    /// Snapshot of the retained result records, oldest first.
    #[must_use]
    pub fn snapshot_results(&self) -> Vec<TaskResult> {
        self.results.lock().buffer.iter().cloned().collect()
    }

    /// Discard the retained result records. Counters are kept.
    pub fn clear_results(&self) {
        self.results.lock().buffer.clear();
    }

    /// Counts of tracked tasks by lifecycle stage.
    #[must_use]
    pub fn summary(&self) -> QueueStatus {
        let table = self.status.lock();
        let mut summary = QueueStatus::default();
        for status in table.statuses.values() {
            match status {
                TaskStatus::Pending => summary.pending_tasks += 1,
                TaskStatus::Running => summary.running_tasks += 1,
                TaskStatus::Completed => summary.completed_tasks += 1,
                _ => {}
            }
        }
        summary
    }

    /// Mark every pending task `Cancelled` and drop its record. Returns how
    /// many tasks were abandoned. Used during shutdown.
    pub fn abandon_pending(&self) -> usize {
        let mut table = self.status.lock();
        let StatusTable { statuses, tasks } = &mut *table;
        let mut abandoned = 0;
        for (id, status) in statuses.iter_mut() {
            if *status == TaskStatus::Pending {
                *status = TaskStatus::Cancelled;
                tasks.remove(id);
                abandoned += 1;
            }
        }
        abandoned
    }

    /// Drop all lifecycle state and retained results.
    pub fn clear(&self) {
        {
            let mut table = self.status.lock();
            table.statuses.clear();
            table.tasks.clear();
        }
        self.results.lock().buffer.clear();
    }

    /// Find tasks past their execution or waiting budget.
    ///
    /// `default_timeout` applies to tasks without their own; the effective
    /// execution budget is additionally capped by `max_task_duration`. A
    /// pending task is overdue after twice the default timeout.
    pub(crate) fn scan_overdue(
        &self,
        default_timeout: Duration,
        max_task_duration: Duration,
    ) -> Vec<Overdue> {
        let now = Instant::now();
        let table = self.status.lock();
        let mut overdue = Vec::new();
        for (&id, &status) in &table.statuses {
            let Some(task) = table.tasks.get(&id) else {
                continue;
            };
            let elapsed = now.saturating_duration_since(task.submit_time);
            match status {
                TaskStatus::Running => {
                    let budget = task
                        .timeout
                        .unwrap_or(default_timeout)
                        .min(max_task_duration);
                    if elapsed > budget {
                        overdue.push(Overdue {
                            id,
                            kind: OverdueKind::Execution,
                        });
                    }
                }
                TaskStatus::Pending => {
                    if elapsed > default_timeout * 2 {
                        overdue.push(Overdue {
                            id,
                            kind: OverdueKind::Waiting,
                        });
                    }
                }
                _ => {}
            }
        }
        overdue
    }

    /// Recompute the mean execution time over the retained results.
    pub(crate) fn refresh_average_execution(&self) {
        let mut results = self.results.lock();
        if !results.buffer.is_empty() {
            let total_ms: f64 = results
                .buffer
                .iter()
                .map(|r| r.execution_time.as_secs_f64() * 1000.0)
                .sum();
            results.metrics.average_execution_ms = total_ms / results.buffer.len() as f64;
        }
        results.metrics.last_update = Instant::now();
    }

    /// Store the latest derived resource usage sample.
    pub(crate) fn record_usage(&self, cpu_usage: f64, memory_usage: u64, load_factor: f64) {
        let mut results = self.results.lock();
        results.metrics.cpu_usage = cpu_usage;
        results.metrics.memory_usage = memory_usage;
        results.metrics.load_factor = load_factor;
        results.metrics.last_update = Instant::now();
    }

    /// Clone of the current performance counters.
    #[must_use]
    pub fn metrics_snapshot(&self) -> PerformanceMetrics {
        self.results.lock().metrics.clone()
    }
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{Priority, ResultStatus, TaskOutcome, TaskType};
    use serde_json::Value;

    fn make_task(priority: Priority) -> Task {
        Task::new(TaskType::UserDefined, priority, || {
            TaskOutcome::success(Value::Null)
        })
    }

    fn result_for(id: TaskId, status: ResultStatus) -> TaskResult {
        TaskResult::new(id, status)
    }

    #[test]
    fn ids_are_unique_and_positive() {
        let registry = TaskRegistry::new();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            let (id, _) = registry.insert_pending(make_task(Priority::Normal));
            assert!(id > 0);
            assert!(seen.insert(id));
        }
        assert_eq!(registry.metrics_snapshot().total_tasks_submitted, 100);
    }

    #[test]
    fn lifecycle_is_monotone() {
        let registry = TaskRegistry::new();
        let (id, _) = registry.insert_pending(make_task(Priority::Normal));
        assert_eq!(registry.status(id), Some(TaskStatus::Pending));

        assert!(registry.mark_running(id));
        assert_eq!(registry.status(id), Some(TaskStatus::Running));
        // A running task cannot be marked running again or cancelled.
        assert!(!registry.mark_running(id));
        assert!(!registry.cancel_if_pending(id));

        assert!(registry.commit(id, TaskStatus::Completed, result_for(id, ResultStatus::Success)));
        assert_eq!(registry.status(id), Some(TaskStatus::Completed));
        // Terminal states are final: the second commit is discarded.
        assert!(!registry.commit(id, TaskStatus::Failed, result_for(id, ResultStatus::Failure)));
        assert_eq!(registry.snapshot_results().len(), 1);
    }

    #[test]
    fn cancel_only_touches_pending_tasks() {
        let registry = TaskRegistry::new();
        let (id, _) = registry.insert_pending(make_task(Priority::Low));
        assert!(registry.cancel_if_pending(id));
        assert_eq!(registry.status(id), Some(TaskStatus::Cancelled));
        assert!(!registry.cancel_if_pending(id));
        // Cancellation leaves no result record.
        assert!(registry.snapshot_results().is_empty());
        assert!(!registry.cancel_if_pending(9999));
    }

    #[test]
    fn results_buffer_is_bounded_fifo() {
        let registry = TaskRegistry::with_capacity(3);
        for _ in 0..5 {
            let (id, _) = registry.insert_pending(make_task(Priority::Normal));
            assert!(registry.mark_running(id));
            assert!(registry.commit(
                id,
                TaskStatus::Completed,
                result_for(id, ResultStatus::Success)
            ));
        }
        let results = registry.snapshot_results();
        assert_eq!(results.len(), 3);
        // Oldest records were evicted; the newest three remain in order.
        let ids: Vec<TaskId> = results.iter().map(|r| r.task_id).collect();
        assert_eq!(ids, vec![3, 4, 5]);
        assert_eq!(registry.metrics_snapshot().total_tasks_completed, 5);
    }

    #[test]
    fn failed_commits_count_separately() {
        let registry = TaskRegistry::new();
        let (id, _) = registry.insert_pending(make_task(Priority::Normal));
        registry.mark_running(id);
        registry.commit(id, TaskStatus::Failed, result_for(id, ResultStatus::Failure));

        let (id2, _) = registry.insert_pending(make_task(Priority::Normal));
        registry.mark_running(id2);
        registry.commit(id2, TaskStatus::Timeout, result_for(id2, ResultStatus::Failure));

        let metrics = registry.metrics_snapshot();
        assert_eq!(metrics.total_tasks_completed, 0);
        assert_eq!(metrics.total_tasks_failed, 2);
    }

    #[test]
    fn scan_finds_overdue_running_and_pending() {
        let registry = TaskRegistry::new();
        let (slow_id, _) = registry.insert_pending(
            make_task(Priority::Normal).with_timeout(Duration::from_millis(10)),
        );
        registry.mark_running(slow_id);
        let (stuck_id, _) = registry.insert_pending(make_task(Priority::Normal));

        std::thread::sleep(Duration::from_millis(40));
        let overdue = registry.scan_overdue(Duration::from_millis(15), Duration::from_secs(60));
        let kinds: HashMap<TaskId, OverdueKind> =
            overdue.iter().map(|o| (o.id, o.kind)).collect();
        assert_eq!(kinds.get(&slow_id), Some(&OverdueKind::Execution));
        assert_eq!(kinds.get(&stuck_id), Some(&OverdueKind::Waiting));
    }

    #[test]
    fn ceiling_caps_task_timeout() {
        let registry = TaskRegistry::new();
        let (id, _) = registry
            .insert_pending(make_task(Priority::Normal).with_timeout(Duration::from_secs(60)));
        registry.mark_running(id);
        std::thread::sleep(Duration::from_millis(30));
        // The per-task ceiling wins over the generous task timeout.
        let overdue = registry.scan_overdue(Duration::from_secs(60), Duration::from_millis(10));
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].kind, OverdueKind::Execution);
    }

    #[test]
    fn abandon_pending_cancels_queue_residue() {
        let registry = TaskRegistry::new();
        let (pending_id, _) = registry.insert_pending(make_task(Priority::Normal));
        let (running_id, _) = registry.insert_pending(make_task(Priority::Normal));
        registry.mark_running(running_id);

        assert_eq!(registry.abandon_pending(), 1);
        assert_eq!(registry.status(pending_id), Some(TaskStatus::Cancelled));
        assert_eq!(registry.status(running_id), Some(TaskStatus::Running));

        registry.clear();
        assert_eq!(registry.status(pending_id), None);
        assert!(registry.snapshot_results().is_empty());
    }

    #[test]
    fn summary_counts_by_stage() {
        let registry = TaskRegistry::new();
        let (a, _) = registry.insert_pending(make_task(Priority::Normal));
        let (b, _) = registry.insert_pending(make_task(Priority::Normal));
        let (_c, _) = registry.insert_pending(make_task(Priority::Normal));
        registry.mark_running(a);
        registry.commit(a, TaskStatus::Completed, result_for(a, ResultStatus::Success));
        registry.mark_running(b);

        let summary = registry.summary();
        assert_eq!(summary.pending_tasks, 1);
        assert_eq!(summary.running_tasks, 1);
        assert_eq!(summary.completed_tasks, 1);
    }
}
