//! Task data model: identifiers, priorities, lifecycle states, and results.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique task identifier, monotonically increasing per scheduler instance.
pub type TaskId = u64;

/// Sentinel id returned by `submit` when a task is rejected.
pub const INVALID_TASK_ID: TaskId = 0;

/// Scheduling priority, highest urgency first.
///
/// Ordering follows declaration order: `Critical` sorts before `Background`,
/// so a plain `<` comparison means "more urgent than".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    /// Must run before everything else.
    Critical,
    /// Latency-sensitive work.
    High,
    /// Default priority.
    Normal,
    /// Deferred work.
    Low,
    /// Runs only when nothing else is queued.
    Background,
}

impl Priority {
    /// All priority levels, most urgent first.
    pub const ALL: [Priority; 5] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
        Priority::Background,
    ];

    /// Numeric rank; smaller means more urgent.
    #[must_use]
    pub fn rank(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Priority::Critical => "CRITICAL",
            Priority::High => "HIGH",
            Priority::Normal => "NORMAL",
            Priority::Low => "LOW",
            Priority::Background => "BACKGROUND",
        };
        f.write_str(name)
    }
}

/// Workload tag used for telemetry and grouping; has no effect on scheduling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    /// Model inference work.
    AiInference,
    /// Image transformation work.
    ImageProcessing,
    /// Analytics and aggregation work.
    DataAnalysis,
    /// Internal housekeeping.
    SystemMaintenance,
    /// Anything else.
    UserDefined,
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskType::AiInference => "AI_INFERENCE",
            TaskType::ImageProcessing => "IMAGE_PROCESSING",
            TaskType::DataAnalysis => "DATA_ANALYSIS",
            TaskType::SystemMaintenance => "SYSTEM_MAINTENANCE",
            TaskType::UserDefined => "USER_DEFINED",
        };
        f.write_str(name)
    }
}

/// Lifecycle state of a task.
///
/// Transitions: `Pending -> Running -> {Completed | Failed | Timeout}`, with
/// `Cancelled` reachable only from `Pending`. Terminal states are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskStatus {
    /// Accepted and waiting in the queue.
    Pending,
    /// Currently executing on a worker.
    Running,
    /// Finished successfully.
    Completed,
    /// The task function failed or panicked.
    Failed,
    /// Cancelled while still pending.
    Cancelled,
    /// Forced to a terminal state by the timeout watchdog.
    Timeout,
}

impl TaskStatus {
    /// True for states a task can never leave.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled | TaskStatus::Timeout
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Completed => "COMPLETED",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Cancelled => "CANCELLED",
            TaskStatus::Timeout => "TIMEOUT",
        };
        f.write_str(name)
    }
}

/// Outcome classification carried by a [`TaskResult`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultStatus {
    /// The task function completed and reported success.
    Success,
    /// The task function failed, panicked, or reported a non-success outcome.
    Failure,
    /// The task exceeded its time budget.
    Timeout,
    /// The task was cancelled before running.
    Cancelled,
}

impl fmt::Display for ResultStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResultStatus::Success => "SUCCESS",
            ResultStatus::Failure => "FAILURE",
            ResultStatus::Timeout => "TIMEOUT",
            ResultStatus::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// What a task function returns.
///
/// A function may signal failure either by returning a non-`Success` outcome
/// or by panicking; both are committed as `Failed`.
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    /// Success or failure classification.
    pub status: ResultStatus,
    /// Opaque payload produced by the task.
    pub value: Value,
    /// Human-readable error description when the task failed.
    pub error: String,
}

impl TaskOutcome {
    /// A successful outcome carrying `value`.
    #[must_use]
    pub fn success(value: Value) -> Self {
        Self {
            status: ResultStatus::Success,
            value,
            error: String::new(),
        }
    }

    /// A failed outcome with an error description.
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            status: ResultStatus::Failure,
            value: Value::Null,
            error: error.into(),
        }
    }
}

/// Signature of a user-supplied task function.
pub type TaskFn = Arc<dyn Fn() -> TaskOutcome + Send + Sync + 'static>;

/// A unit of work submitted to the scheduler.
///
/// `id` and `submit_time` are stamped by the scheduler at submission; a
/// `timeout` of `None` resolves to the configured default at that point.
/// `dependencies` is carried for callers that track task graphs but is not
/// interpreted by the scheduler: all tasks are independent.
#[derive(Clone)]
pub struct Task {
    /// Scheduler-assigned identifier; `INVALID_TASK_ID` until submitted.
    pub id: TaskId,
    /// Telemetry tag.
    pub task_type: TaskType,
    /// Queue ordering priority.
    pub priority: Priority,
    /// The work itself.
    pub function: TaskFn,
    /// Wall-clock budget from submission to completion.
    pub timeout: Option<Duration>,
    /// Stamped by the scheduler when the task is accepted.
    pub submit_time: Instant,
    /// Opaque caller-supplied parameters; not interpreted by the scheduler.
    pub parameters: HashMap<String, Value>,
    /// Reserved; ignored by the scheduler.
    pub dependencies: Vec<TaskId>,
}

impl Task {
    /// Create a task from its type, priority, and function.
    pub fn new<F>(task_type: TaskType, priority: Priority, function: F) -> Self
    where
        F: Fn() -> TaskOutcome + Send + Sync + 'static,
    {
        Self {
            id: INVALID_TASK_ID,
            task_type,
            priority,
            function: Arc::new(function),
            timeout: None,
            submit_time: Instant::now(),
            parameters: HashMap::new(),
            dependencies: Vec::new(),
        }
    }

    /// Set an explicit per-task timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Attach a single opaque parameter.
    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: Value) -> Self {
        self.parameters.insert(key.into(), value);
        self
    }

    /// Replace the full parameter map.
    #[must_use]
    pub fn with_parameters(mut self, parameters: HashMap<String, Value>) -> Self {
        self.parameters = parameters;
        self
    }

    /// Record dependency edges for the caller's bookkeeping.
    #[must_use]
    pub fn with_dependencies(mut self, dependencies: Vec<TaskId>) -> Self {
        self.dependencies = dependencies;
        self
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("task_type", &self.task_type)
            .field("priority", &self.priority)
            .field("timeout", &self.timeout)
            .field("submit_time", &self.submit_time)
            .field("parameters", &self.parameters)
            .field("dependencies", &self.dependencies)
            .finish_non_exhaustive()
    }
}

/// Terminal record produced for a task that completed, failed, or timed out.
#[derive(Debug, Clone)]
pub struct TaskResult {
    /// Id of the task this record belongs to.
    pub task_id: TaskId,
    /// Outcome classification.
    pub status: ResultStatus,
    /// Opaque payload returned by the task function.
    pub result: Value,
    /// Error description for non-success outcomes.
    pub error_message: String,
    /// Time spent inside the task function.
    pub execution_time: Duration,
    /// When the terminal state was reached.
    pub completion_time: Instant,
}

impl TaskResult {
    /// Build a result record with empty payload and message.
    #[must_use]
    pub fn new(task_id: TaskId, status: ResultStatus) -> Self {
        Self {
            task_id,
            status,
            result: Value::Null,
            error_message: String::new(),
            execution_time: Duration::ZERO,
            completion_time: Instant::now(),
        }
    }
}
