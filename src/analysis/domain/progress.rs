//! Progress, timing and failure records carried by an analysis task.

use super::PipelineStep;
use chrono::{DateTime, Utc};
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Step-level progress of a task's pipeline.
///
/// The percentage is derived from the step counters on every read and is
/// never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct TaskProgress {
    total_steps: u32,
    completed_steps: u32,
    current_step: Option<PipelineStep>,
}

impl TaskProgress {
    /// Creates progress for a pipeline that has not started.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            total_steps: PipelineStep::COUNT,
            completed_steps: 0,
            current_step: None,
        }
    }

    /// Reconstructs persisted progress, clamping completed steps to the total.
    #[must_use]
    pub fn from_parts(
        total_steps: u32,
        completed_steps: u32,
        current_step: Option<PipelineStep>,
    ) -> Self {
        Self {
            total_steps,
            completed_steps: completed_steps.min(total_steps),
            current_step,
        }
    }

    /// Total number of steps.
    #[must_use]
    pub const fn total_steps(&self) -> u32 {
        self.total_steps
    }

    /// Number of finished steps.
    #[must_use]
    pub const fn completed_steps(&self) -> u32 {
        self.completed_steps
    }

    /// Step currently executing, if the pipeline has started.
    #[must_use]
    pub const fn current_step(&self) -> Option<PipelineStep> {
        self.current_step
    }

    /// Completion percentage, rounded half up; `0` when there are no steps.
    #[must_use]
    #[expect(
        clippy::integer_division,
        reason = "rounded integer percentage is the intended result"
    )]
    pub fn percentage(&self) -> u8 {
        if self.total_steps == 0 {
            return 0;
        }
        let total = u64::from(self.total_steps);
        let scaled = u64::from(self.completed_steps) * 100 + total / 2;
        u8::try_from(scaled / total).unwrap_or(100)
    }

    /// Marks `step` as the current step. Completed steps never decrease.
    pub(crate) fn enter(&mut self, step: PipelineStep) {
        self.current_step = Some(step);
        self.completed_steps = self.completed_steps.max(step.ordinal());
    }

    /// Records that `step` has finished.
    pub(crate) fn finish(&mut self, step: PipelineStep) {
        self.completed_steps = self
            .completed_steps
            .max(step.ordinal() + 1)
            .min(self.total_steps);
    }

    /// Records that every step has finished.
    pub(crate) const fn finish_all(&mut self) {
        self.completed_steps = self.total_steps;
    }
}

impl Default for TaskProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for TaskProgress {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("TaskProgress", 4)?;
        state.serialize_field("total_steps", &self.total_steps)?;
        state.serialize_field("completed_steps", &self.completed_steps)?;
        state.serialize_field("current_step", &self.current_step)?;
        state.serialize_field("percentage", &self.percentage())?;
        state.end()
    }
}

/// Lifecycle timestamps of a task attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskTiming {
    /// When the task (or its latest retry) entered the queue.
    pub queued_at: DateTime<Utc>,
    /// When a worker claimed the current attempt.
    pub started_at: Option<DateTime<Utc>>,
    /// When the attempt reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Milliseconds between start and successful completion.
    pub duration_ms: Option<i64>,
    /// Expected completion time of the current attempt.
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl TaskTiming {
    /// Creates timing for a task queued at `queued_at`.
    #[must_use]
    pub const fn queued(queued_at: DateTime<Utc>) -> Self {
        Self {
            queued_at,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            estimated_completion: None,
        }
    }
}

/// Classification of a task failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskErrorCode {
    /// The application has no interview responses.
    NoResponses,
    /// Too many individual response analyses failed.
    TooManyResponseFailures,
    /// The AI backend returned an error.
    BackendFailure,
    /// The AI backend did not answer within the step timeout.
    BackendTimeout,
    /// Task store or interview data access failed.
    StorageFailure,
    /// The worker owning the task disappeared.
    WorkerLost,
    /// The task aggregate rejected a lifecycle change.
    Internal,
}

impl TaskErrorCode {
    /// Returns the canonical representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NoResponses => "no_responses",
            Self::TooManyResponseFailures => "too_many_response_failures",
            Self::BackendFailure => "backend_failure",
            Self::BackendTimeout => "backend_timeout",
            Self::StorageFailure => "storage_failure",
            Self::WorkerLost => "worker_lost",
            Self::Internal => "internal",
        }
    }
}

impl fmt::Display for TaskErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Failure recorded on a task in the `failed` status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskError {
    /// Human-readable failure message.
    pub message: String,
    /// Failure classification.
    pub code: TaskErrorCode,
    /// Chain of underlying error sources, outermost first.
    pub stack: Option<String>,
    /// Pipeline step that failed, when known.
    pub step: Option<PipelineStep>,
}

impl TaskError {
    /// Creates an error record without source chain.
    #[must_use]
    pub fn new(
        code: TaskErrorCode,
        message: impl Into<String>,
        step: Option<PipelineStep>,
    ) -> Self {
        Self {
            message: message.into(),
            code,
            stack: None,
            step,
        }
    }

    /// Records the source chain of `err`.
    #[must_use]
    pub fn with_source_chain(mut self, err: &(dyn std::error::Error + 'static)) -> Self {
        let mut chain = Vec::new();
        let mut source = err.source();
        while let Some(cause) = source {
            chain.push(cause.to_string());
            source = cause.source();
        }
        if !chain.is_empty() {
            self.stack = Some(chain.join("\ncaused by: "));
        }
        self
    }
}

impl fmt::Display for TaskError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.step {
            Some(step) => write!(f, "[{}] {} at {step}", self.code, self.message),
            None => write!(f, "[{}] {}", self.code, self.message),
        }
    }
}
