//! Analysis task aggregate root.

use super::{
    AnalysisDomainError, AnalysisResults, ApplicationId, PipelineStep, TaskError, TaskId,
    TaskPriority, TaskProgress, TaskStatus, TaskTiming, WorkerId, WorkspaceId,
};
use chrono::{DateTime, Utc};
use mockable::Clock;
use serde::{Deserialize, Serialize};

/// Attempt budget used when the caller does not supply one.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Analysis task aggregate root.
///
/// Status changes go through the lifecycle guard in
/// [`TaskStatus::can_transition_to`]; every mutator refreshes `updated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisTask {
    id: TaskId,
    application_id: ApplicationId,
    workspace_id: WorkspaceId,
    status: TaskStatus,
    priority: TaskPriority,
    progress: TaskProgress,
    timing: TaskTiming,
    error: Option<TaskError>,
    retry_count: u32,
    max_retries: u32,
    worker_id: Option<WorkerId>,
    results: Option<AnalysisResults>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

/// Parameter object for reconstructing a persisted task aggregate.
#[derive(Debug, Clone, PartialEq)]
pub struct PersistedAnalysisTaskData {
    /// Persisted task identifier.
    pub id: TaskId,
    /// Application under analysis.
    pub application_id: ApplicationId,
    /// Owning workspace.
    pub workspace_id: WorkspaceId,
    /// Lifecycle status.
    pub status: TaskStatus,
    /// Dequeue priority.
    pub priority: TaskPriority,
    /// Pipeline progress.
    pub progress: TaskProgress,
    /// Lifecycle timestamps.
    pub timing: TaskTiming,
    /// Recorded failure.
    pub error: Option<TaskError>,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Attempt budget.
    pub max_retries: u32,
    /// Worker currently or last processing the task.
    pub worker_id: Option<WorkerId>,
    /// Results of a completed analysis.
    pub results: Option<AnalysisResults>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Latest mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AnalysisTask {
    /// Creates a `pending` task for `application_id`.
    #[must_use]
    pub fn new(
        application_id: ApplicationId,
        workspace_id: WorkspaceId,
        priority: TaskPriority,
        max_retries: u32,
        clock: &impl Clock,
    ) -> Self {
        let timestamp = clock.utc();
        Self {
            id: TaskId::generate(&application_id),
            application_id,
            workspace_id,
            status: TaskStatus::Pending,
            priority,
            progress: TaskProgress::new(),
            timing: TaskTiming::queued(timestamp),
            error: None,
            retry_count: 0,
            max_retries,
            worker_id: None,
            results: None,
            created_at: timestamp,
            updated_at: timestamp,
        }
    }

    /// Reconstructs a task from persisted storage.
    #[must_use]
    pub fn from_persisted(data: PersistedAnalysisTaskData) -> Self {
        Self {
            id: data.id,
            application_id: data.application_id,
            workspace_id: data.workspace_id,
            status: data.status,
            priority: data.priority,
            progress: data.progress,
            timing: data.timing,
            error: data.error,
            retry_count: data.retry_count,
            max_retries: data.max_retries,
            worker_id: data.worker_id,
            results: data.results,
            created_at: data.created_at,
            updated_at: data.updated_at,
        }
    }

    /// Returns the task identifier.
    #[must_use]
    pub const fn id(&self) -> &TaskId {
        &self.id
    }

    /// Returns the application under analysis.
    #[must_use]
    pub const fn application_id(&self) -> &ApplicationId {
        &self.application_id
    }

    /// Returns the owning workspace.
    #[must_use]
    pub const fn workspace_id(&self) -> &WorkspaceId {
        &self.workspace_id
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub const fn status(&self) -> TaskStatus {
        self.status
    }

    /// Returns the dequeue priority.
    #[must_use]
    pub const fn priority(&self) -> TaskPriority {
        self.priority
    }

    /// Returns pipeline progress.
    #[must_use]
    pub const fn progress(&self) -> &TaskProgress {
        &self.progress
    }

    /// Returns lifecycle timestamps.
    #[must_use]
    pub const fn timing(&self) -> &TaskTiming {
        &self.timing
    }

    /// Returns the recorded failure, present only while `failed`.
    #[must_use]
    pub const fn error(&self) -> Option<&TaskError> {
        self.error.as_ref()
    }

    /// Returns the number of failed attempts.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Returns the attempt budget.
    #[must_use]
    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Returns the worker currently or last processing the task.
    #[must_use]
    pub const fn worker_id(&self) -> Option<&WorkerId> {
        self.worker_id.as_ref()
    }

    /// Returns results, present only once `completed`.
    #[must_use]
    pub const fn results(&self) -> Option<&AnalysisResults> {
        self.results.as_ref()
    }

    /// Returns the creation timestamp.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Returns the latest mutation timestamp.
    #[must_use]
    pub const fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Returns `true` when the task failed and attempts remain.
    #[must_use]
    pub const fn can_retry(&self) -> bool {
        matches!(self.status, TaskStatus::Failed) && self.retry_count < self.max_retries
    }

    /// Assigns the task to `worker_id` and moves it to `processing`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::InvalidStateTransition`] unless the
    /// task is `pending`.
    pub fn claim(
        &mut self,
        worker_id: WorkerId,
        clock: &impl Clock,
    ) -> Result<(), AnalysisDomainError> {
        self.transition_to(TaskStatus::Processing)?;
        let timestamp = clock.utc();
        self.worker_id = Some(worker_id);
        self.progress = TaskProgress::new();
        self.timing.started_at = Some(timestamp);
        self.timing.completed_at = None;
        self.timing.duration_ms = None;
        self.updated_at = timestamp;
        Ok(())
    }

    /// Records that the pipeline entered `step`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::NotProcessing`] unless the task is
    /// `processing`.
    pub fn enter_step(
        &mut self,
        step: PipelineStep,
        clock: &impl Clock,
    ) -> Result<(), AnalysisDomainError> {
        self.ensure_processing()?;
        self.progress.enter(step);
        self.touch(clock);
        Ok(())
    }

    /// Records that the pipeline finished `step`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::NotProcessing`] unless the task is
    /// `processing`.
    pub fn finish_step(
        &mut self,
        step: PipelineStep,
        clock: &impl Clock,
    ) -> Result<(), AnalysisDomainError> {
        self.ensure_processing()?;
        self.progress.finish(step);
        self.touch(clock);
        Ok(())
    }

    /// Records the expected completion time of the current attempt.
    pub fn estimate_completion(&mut self, at: DateTime<Utc>) {
        self.timing.estimated_completion = Some(at);
    }

    /// Marks the task `completed` with `results`.
    ///
    /// The duration is computed here once and never recomputed.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::InvalidStateTransition`] unless the
    /// task is `processing`.
    pub fn complete(
        &mut self,
        results: AnalysisResults,
        clock: &impl Clock,
    ) -> Result<(), AnalysisDomainError> {
        self.transition_to(TaskStatus::Completed)?;
        let timestamp = clock.utc();
        self.progress.finish_all();
        self.results = Some(results);
        self.error = None;
        self.timing.completed_at = Some(timestamp);
        self.timing.duration_ms = self
            .timing
            .started_at
            .map(|started| (timestamp - started).num_milliseconds());
        self.updated_at = timestamp;
        Ok(())
    }

    /// Marks the task `failed`, recording `error` and consuming one attempt.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::InvalidStateTransition`] unless the
    /// task is `processing`.
    pub fn fail(
        &mut self,
        error: TaskError,
        clock: &impl Clock,
    ) -> Result<(), AnalysisDomainError> {
        self.transition_to(TaskStatus::Failed)?;
        let timestamp = clock.utc();
        self.error = Some(error);
        self.retry_count = self.retry_count.saturating_add(1);
        self.timing.completed_at = Some(timestamp);
        self.updated_at = timestamp;
        Ok(())
    }

    /// Marks the task `cancelled`.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::InvalidStateTransition`] unless the
    /// task is `pending` or `processing`.
    pub fn cancel(&mut self, clock: &impl Clock) -> Result<(), AnalysisDomainError> {
        self.transition_to(TaskStatus::Cancelled)?;
        let timestamp = clock.utc();
        self.timing.completed_at = Some(timestamp);
        self.updated_at = timestamp;
        Ok(())
    }

    /// Returns a failed task to `pending` for another attempt.
    ///
    /// Progress, error, worker assignment and attempt timestamps are reset;
    /// the failed-attempt counter is kept.
    ///
    /// # Errors
    ///
    /// Returns [`AnalysisDomainError::InvalidStateTransition`] unless the
    /// task is `failed`, or [`AnalysisDomainError::RetryLimitReached`] once
    /// the attempt budget is spent.
    pub fn retry(&mut self, clock: &impl Clock) -> Result<(), AnalysisDomainError> {
        if self.status == TaskStatus::Failed && self.retry_count >= self.max_retries {
            return Err(AnalysisDomainError::RetryLimitReached {
                task_id: self.id.clone(),
                retry_count: self.retry_count,
                max_retries: self.max_retries,
            });
        }
        self.transition_to(TaskStatus::Pending)?;
        let timestamp = clock.utc();
        self.progress = TaskProgress::new();
        self.error = None;
        self.worker_id = None;
        self.results = None;
        self.timing = TaskTiming::queued(timestamp);
        self.updated_at = timestamp;
        Ok(())
    }

    fn transition_to(&mut self, target: TaskStatus) -> Result<(), AnalysisDomainError> {
        if !self.status.can_transition_to(target) {
            return Err(AnalysisDomainError::InvalidStateTransition {
                task_id: self.id.clone(),
                from: self.status,
                to: target,
            });
        }
        self.status = target;
        Ok(())
    }

    fn ensure_processing(&self) -> Result<(), AnalysisDomainError> {
        if self.status == TaskStatus::Processing {
            return Ok(());
        }
        Err(AnalysisDomainError::NotProcessing {
            task_id: self.id.clone(),
            status: self.status,
        })
    }

    fn touch(&mut self, clock: &impl Clock) {
        self.updated_at = clock.utc();
    }
}
