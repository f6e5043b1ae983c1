//! Task lifecycle status, priority and pipeline step enumerations.

use super::{ParsePipelineStepError, ParseTaskPriorityError, ParseTaskStatusError};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Analysis task lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Task is waiting to be claimed by a worker.
    Pending,
    /// Task is owned by a worker and running its pipeline.
    Processing,
    /// Task finished and its results are persisted.
    Completed,
    /// Task failed; it may be retried while attempts remain.
    Failed,
    /// Task was cancelled before completing.
    Cancelled,
}

impl TaskStatus {
    /// Every status, in declaration order.
    pub const ALL: [Self; 5] = [
        Self::Pending,
        Self::Processing,
        Self::Completed,
        Self::Failed,
        Self::Cancelled,
    ];

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Returns `true` for statuses that count towards the one in-flight task
    /// allowed per application.
    #[must_use]
    pub const fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Processing)
    }

    /// Returns `true` for statuses with no further automatic progress.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Returns `true` when the lifecycle permits moving to `target`.
    ///
    /// `Failed -> Pending` is the retry edge; `Completed` and `Cancelled`
    /// accept no transitions.
    #[must_use]
    pub const fn can_transition_to(self, target: Self) -> bool {
        matches!(
            (self, target),
            (Self::Pending, Self::Processing | Self::Cancelled)
                | (
                    Self::Processing,
                    Self::Completed | Self::Failed | Self::Cancelled
                )
                | (Self::Failed, Self::Pending)
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskStatus {
    type Error = ParseTaskStatusError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(ParseTaskStatusError(value.to_owned())),
        }
    }
}

/// Dequeue priority of a task. Affects ordering only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskPriority {
    /// Dispatched before everything else.
    High,
    /// Default priority.
    #[default]
    Normal,
    /// Dispatched only when nothing else is ready.
    Low,
}

impl TaskPriority {
    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }

    /// Dispatch rank; lower ranks are dispatched first.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Normal => 1,
            Self::Low => 2,
        }
    }
}

impl fmt::Display for TaskPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TaskPriority {
    type Error = ParseTaskPriorityError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(ParseTaskPriorityError(value.to_owned())),
        }
    }
}

/// Checkpointed step of the analysis pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Loading the application's interview responses.
    FetchingResponses,
    /// Scoring each response that lacks a completed analysis.
    AnalyzingIndividual,
    /// Producing the holistic interview assessment.
    AnalyzingOverall,
    /// Persisting results on the task and the application.
    SavingResults,
}

impl PipelineStep {
    /// Pipeline steps in execution order.
    pub const ALL: [Self; 4] = [
        Self::FetchingResponses,
        Self::AnalyzingIndividual,
        Self::AnalyzingOverall,
        Self::SavingResults,
    ];

    /// Number of steps in the pipeline.
    pub const COUNT: u32 = 4;

    /// Returns the canonical storage representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FetchingResponses => "fetching_responses",
            Self::AnalyzingIndividual => "analyzing_individual",
            Self::AnalyzingOverall => "analyzing_overall",
            Self::SavingResults => "saving_results",
        }
    }

    /// Number of steps that precede this one.
    #[must_use]
    pub const fn ordinal(self) -> u32 {
        match self {
            Self::FetchingResponses => 0,
            Self::AnalyzingIndividual => 1,
            Self::AnalyzingOverall => 2,
            Self::SavingResults => 3,
        }
    }

    /// Human-readable message published when the step starts.
    #[must_use]
    pub const fn description(self) -> &'static str {
        match self {
            Self::FetchingResponses => "Fetching interview responses",
            Self::AnalyzingIndividual => "Analyzing individual responses",
            Self::AnalyzingOverall => "Generating overall interview analysis",
            Self::SavingResults => "Saving analysis results",
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for PipelineStep {
    type Error = ParsePipelineStepError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "fetching_responses" => Ok(Self::FetchingResponses),
            "analyzing_individual" => Ok(Self::AnalyzingIndividual),
            "analyzing_overall" => Ok(Self::AnalyzingOverall),
            "saving_results" => Ok(Self::SavingResults),
            _ => Err(ParsePipelineStepError(value.to_owned())),
        }
    }
}
