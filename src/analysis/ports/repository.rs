//! Repository port for analysis task persistence.

use crate::analysis::domain::{AnalysisTask, ApplicationId, TaskId, TaskStatus};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for task repository operations.
pub type TaskRepositoryResult<T> = Result<T, TaskRepositoryError>;

/// Task Store contract.
///
/// Implementations must make [`claim`](Self::claim) and
/// [`update_if_status`](Self::update_if_status) atomic with respect to each
/// other so that two workers never own the same task.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisTaskRepository: Send + Sync {
    /// Stores a new task.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::DuplicateTask`] when the identifier
    /// already exists or [`TaskRepositoryError::ActiveTaskExists`] when the
    /// application already has a `pending` or `processing` task.
    async fn store(&self, task: &AnalysisTask) -> TaskRepositoryResult<()>;

    /// Finds a task by identifier.
    ///
    /// Returns `None` when the task does not exist.
    async fn find_by_id(&self, id: &TaskId) -> TaskRepositoryResult<Option<AnalysisTask>>;

    /// Finds the `pending` or `processing` task of an application.
    async fn find_active_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> TaskRepositoryResult<Option<AnalysisTask>>;

    /// Overwrites an existing task unconditionally.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not exist.
    async fn update(&self, task: &AnalysisTask) -> TaskRepositoryResult<()>;

    /// Overwrites a task only while its stored status equals `expected`.
    ///
    /// Returns `false` when the stored status differs and nothing was
    /// written.
    ///
    /// # Errors
    ///
    /// Returns [`TaskRepositoryError::NotFound`] when the task does not
    /// exist or [`TaskRepositoryError::ActiveTaskExists`] when the write
    /// would give the application a second in-flight task.
    async fn update_if_status(
        &self,
        task: &AnalysisTask,
        expected: TaskStatus,
    ) -> TaskRepositoryResult<bool>;

    /// Atomically moves a stored `pending` task to the `processing` state
    /// carried by `task` (status, worker and start time).
    ///
    /// Returns `false` when the stored task was no longer `pending`; the
    /// caller must not process it.
    async fn claim(&self, task: &AnalysisTask) -> TaskRepositoryResult<bool>;

    /// Lists tasks with the given status, oldest first.
    async fn list_by_status(&self, status: TaskStatus) -> TaskRepositoryResult<Vec<AnalysisTask>>;

    /// Counts tasks with the given status.
    async fn count_by_status(&self, status: TaskStatus) -> TaskRepositoryResult<u64>;
}

/// Errors returned by task repository implementations.
#[derive(Debug, Clone, Error)]
pub enum TaskRepositoryError {
    /// A task with the same identifier already exists.
    #[error("duplicate task identifier: {0}")]
    DuplicateTask(TaskId),

    /// The application already has an in-flight task.
    #[error("application {0} already has an active analysis task")]
    ActiveTaskExists(ApplicationId),

    /// The task was not found.
    #[error("task not found: {0}")]
    NotFound(TaskId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl TaskRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
