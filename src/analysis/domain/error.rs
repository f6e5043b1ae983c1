//! Error types for analysis domain validation and parsing.

use super::{TaskId, TaskStatus};
use thiserror::Error;

/// Errors returned while constructing or mutating analysis domain values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AnalysisDomainError {
    /// The application identifier is empty or contains whitespace.
    #[error("invalid application id '{0}'")]
    InvalidApplicationId(String),

    /// The workspace identifier is empty or contains whitespace.
    #[error("invalid workspace id '{0}'")]
    InvalidWorkspaceId(String),

    /// The worker identifier is empty.
    #[error("worker id must not be empty")]
    EmptyWorkerId,

    /// The task identifier is empty.
    #[error("task id must not be empty")]
    EmptyTaskId,

    /// The requested lifecycle transition is not permitted.
    #[error("task {task_id} cannot transition from {from} to {to}")]
    InvalidStateTransition {
        /// Task whose transition was rejected.
        task_id: TaskId,
        /// Current lifecycle status.
        from: TaskStatus,
        /// Requested lifecycle status.
        to: TaskStatus,
    },

    /// The task has used every attempt it is allowed.
    #[error("task {task_id} exhausted its retries ({retry_count}/{max_retries})")]
    RetryLimitReached {
        /// Task that cannot be retried.
        task_id: TaskId,
        /// Failed attempts recorded so far.
        retry_count: u32,
        /// Attempt budget for the task.
        max_retries: u32,
    },

    /// Progress was reported for a task that is not processing.
    #[error("task {task_id} is {status}, progress can only change while processing")]
    NotProcessing {
        /// Task that rejected the progress update.
        task_id: TaskId,
        /// Current lifecycle status.
        status: TaskStatus,
    },
}

/// Error returned while parsing task statuses from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task status: {0}")]
pub struct ParseTaskStatusError(pub String);

/// Error returned while parsing task priorities from persistence or input.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown task priority: {0}")]
pub struct ParseTaskPriorityError(pub String);

/// Error returned while parsing pipeline steps from persistence.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown pipeline step: {0}")]
pub struct ParsePipelineStepError(pub String);
