//! # taskmill
//!
//! **Taskmill** is an in-process, priority-aware task scheduler on dedicated
//! OS worker threads.
//!
//! Submitted tasks are queued by priority (FIFO within a level), dispatched
//! onto an elastic worker pool, watched for timeouts, and surfaced as
//! terminal result records. A background monitor derives load metrics,
//! enforces coarse resource ceilings by quiescing submission, and scales the
//! pool between configured bounds.
//!
//! | Area            | Description                                               | Key types                                    |
//! |-----------------|-----------------------------------------------------------|----------------------------------------------|
//! | **Scheduling**  | Submit, cancel, query, pause/resume, shutdown.            | [`TaskScheduler`]                            |
//! | **Tasks**       | Units of work with priority, timeout, and opaque payload. | [`Task`], [`TaskOutcome`], [`TaskResult`]    |
//! | **Queue**       | Blocking multi-level priority queue.                      | [`PriorityQueue`]                            |
//! | **Autoscaling** | Load-driven pool resizing with hysteresis and cooldown.   | [`ScalingStrategy`], [`LoadBalancingConfig`] |
//! | **Ceilings**    | Derived CPU/memory/queue limits that pause intake.        | [`ResourceLimits`], [`ResourceProbe`]        |
//! | **Observation** | Counters and queue summaries.                             | [`PerformanceMetrics`], [`QueueStatus`]      |
//!
//! ```no_run
//! use std::time::Duration;
//! use taskmill::{Priority, SchedulerConfig, Task, TaskOutcome, TaskScheduler, TaskType};
//!
//! let scheduler = TaskScheduler::with_config(
//!     SchedulerConfig::default().with_thread_range(2, 8),
//! );
//! scheduler.start().expect("scheduler failed to start");
//!
//! let id = scheduler.submit(
//!     Task::new(TaskType::DataAnalysis, Priority::High, || {
//!         TaskOutcome::success(serde_json::json!({ "rows": 42 }))
//!     })
//!     .with_timeout(Duration::from_secs(5)),
//! );
//! assert_ne!(id, 0);
//!
//! scheduler.shutdown();
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod core;
pub mod scheduler;
pub mod util;

pub use crate::config::{LoadBalancingConfig, ResourceLimits, SchedulerConfig, ScalingStrategy};
pub use crate::core::error::SchedulerError;
pub use crate::core::metrics::{LoadSnapshot, PerformanceMetrics, QueueStatus};
pub use crate::core::probe::{DerivedProbe, ResourceProbe, UsageInputs};
pub use crate::core::queue::PriorityQueue;
pub use crate::core::registry::TaskRegistry;
pub use crate::core::task::{
    Priority, ResultStatus, Task, TaskFn, TaskId, TaskOutcome, TaskResult, TaskStatus, TaskType,
    INVALID_TASK_ID,
};
pub use crate::scheduler::TaskScheduler;
pub use crate::util::init_tracing;
