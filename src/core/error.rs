//! Error types for scheduler operations.

use thiserror::Error;

/// Errors produced by scheduler components.
///
/// Operational failures (rejected submissions, failed cancellations, unknown
/// task ids) are reported through sentinel return values on the facade, not
/// through this type; see [`crate::TaskScheduler`]. `SchedulerError` covers
/// the cases where an API call itself is invalid.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// `start`/`initialize` was called on a scheduler that is already running.
    #[error("scheduler is already running")]
    AlreadyRunning,
    /// Configuration validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// A push was attempted on a stopped queue.
    #[error("queue is stopped")]
    QueueStopped,
}
