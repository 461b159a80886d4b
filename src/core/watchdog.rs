//! Timeout watchdog: forces overdue tasks to a terminal state.
//!
//! A single background thread scans the registry every 100 ms. Running tasks
//! past their effective budget and pending tasks stuck in the queue are
//! committed as `Timeout` with a failure record; the queue entry is removed
//! defensively. Enforcement is accounting-only: the OS thread running a
//! late user function is never killed, its eventual return is simply
//! discarded.

use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use serde_json::Value;
use tracing::{debug, warn};

use crate::core::task::{ResultStatus, TaskResult, TaskStatus};
use crate::scheduler::SchedulerCore;

/// Scan cadence.
pub(crate) const SCAN_INTERVAL: Duration = Duration::from_millis(100);

/// Watchdog thread body; returns when the scheduler stops running.
pub(crate) fn run(core: Arc<SchedulerCore>) {
    debug!("timeout watchdog started");
    while core.running.load(Ordering::Acquire) {
        scan_once(&core);
        thread::sleep(SCAN_INTERVAL);
    }
    debug!("timeout watchdog stopped");
}

/// One scan over the registry.
pub(crate) fn scan_once(core: &SchedulerCore) {
    let (default_timeout, max_task_duration) = {
        let config = core.config.read();
        (
            config.default_timeout(),
            config.resource_limits.max_task_duration(),
        )
    };
    for overdue in core
        .registry
        .scan_overdue(default_timeout, max_task_duration)
    {
        let message = overdue.kind.message();
        let result = TaskResult {
            task_id: overdue.id,
            status: ResultStatus::Failure,
            result: Value::Null,
            error_message: message.to_string(),
            execution_time: Duration::ZERO,
            completion_time: Instant::now(),
        };
        if core.registry.commit(overdue.id, TaskStatus::Timeout, result) {
            warn!(task_id = overdue.id, reason = message, "task timed out");
        }
        core.queue.remove(overdue.id);
    }
}
