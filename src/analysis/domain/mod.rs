//! Domain model for background interview analysis.
//!
//! The analysis domain models the task aggregate and its lifecycle, pipeline
//! progress, and the interview data and AI verdicts flowing through the
//! pipeline. All infrastructure concerns stay outside this boundary.

mod error;
mod ids;
mod interview;
mod progress;
mod results;
mod status;
mod task;

pub use error::{
    AnalysisDomainError, ParsePipelineStepError, ParseTaskPriorityError, ParseTaskStatusError,
};
pub use ids::{ApplicationId, ResponseId, TaskId, WorkerId, WorkspaceId};
pub use interview::{
    CandidateProfile, InterviewContext, InterviewMetadata, InterviewResponse, JobProfile,
    OverallAnalysis, QuestionDetails, Recommendation, ResponseAnalysis,
};
pub use progress::{TaskError, TaskErrorCode, TaskProgress, TaskTiming};
pub use results::{AnalysisResults, FALLBACK_SCORE, IndividualScore, average_score};
pub use status::{PipelineStep, TaskPriority, TaskStatus};
pub use task::{AnalysisTask, DEFAULT_MAX_RETRIES, PersistedAnalysisTaskData};
