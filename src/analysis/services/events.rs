//! Lifecycle events published by the worker manager.

use crate::analysis::domain::{AnalysisResults, PipelineStep, TaskError, TaskId};
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

/// Observable change in a task's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AnalysisEvent {
    /// The pipeline entered a step or advanced within it.
    Progress {
        /// Task reporting progress.
        task_id: TaskId,
        /// Step being executed.
        step: PipelineStep,
        /// Human-readable description.
        message: String,
        /// Items processed so far within the step.
        current: Option<usize>,
        /// Items to process within the step.
        total: Option<usize>,
    },
    /// The task finished successfully.
    Completed {
        /// Completed task.
        task_id: TaskId,
        /// Persisted results.
        results: AnalysisResults,
    },
    /// An attempt failed.
    Failed {
        /// Failed task.
        task_id: TaskId,
        /// Recorded failure.
        error: TaskError,
        /// `true` when another attempt has been scheduled.
        retry: bool,
    },
    /// The manager could not record a task outcome.
    Error {
        /// Affected task.
        task_id: TaskId,
        /// Failure description.
        message: String,
    },
    /// The task was cancelled.
    Cancelled {
        /// Cancelled task.
        task_id: TaskId,
    },
}

impl AnalysisEvent {
    /// Returns the task the event concerns.
    #[must_use]
    pub const fn task_id(&self) -> &TaskId {
        match self {
            Self::Progress { task_id, .. }
            | Self::Completed { task_id, .. }
            | Self::Failed { task_id, .. }
            | Self::Error { task_id, .. }
            | Self::Cancelled { task_id } => task_id,
        }
    }
}

/// Fan-out channel for [`AnalysisEvent`]s.
///
/// Slow subscribers lose the oldest events rather than stalling workers.
#[derive(Debug, Clone)]
pub struct EventPublisher {
    sender: broadcast::Sender<AnalysisEvent>,
}

impl EventPublisher {
    /// Creates a publisher buffering up to `capacity` events per
    /// subscriber.
    ///
    /// # Panics
    ///
    /// Panics when `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Registers a new subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.sender.subscribe()
    }

    /// Returns the number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Publishes an event to all current subscribers.
    pub fn publish(&self, event: AnalysisEvent) {
        if let Err(unsent) = self.sender.send(event) {
            trace!(task_id = %unsent.0.task_id(), "no event subscribers");
        }
    }
}
