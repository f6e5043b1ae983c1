//! AI analysis backend port.

use crate::analysis::domain::{
    CandidateProfile, InterviewContext, InterviewMetadata, InterviewResponse, JobProfile,
    OverallAnalysis, QuestionDetails, ResponseAnalysis,
};
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Input for scoring one interview response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResponseAnalysisRequest {
    /// Question text shown to the candidate.
    pub question_text: String,
    /// Transcribed answer.
    pub response_text: String,
    /// Job the candidate applied for.
    pub job_details: JobProfile,
    /// Full question record.
    pub question_details: QuestionDetails,
    /// Candidate under evaluation.
    pub candidate_info: CandidateProfile,
    /// Extra grading guidance.
    pub evaluation_instructions: Option<String>,
}

impl ResponseAnalysisRequest {
    /// Builds the request for `response` within `context`.
    #[must_use]
    pub fn for_response(response: &InterviewResponse, context: &InterviewContext) -> Self {
        Self {
            question_text: response.question.text.clone(),
            response_text: response.response_text.clone(),
            job_details: context.job.clone(),
            question_details: response.question.clone(),
            candidate_info: context.candidate.clone(),
            evaluation_instructions: response.question.evaluation_instructions.clone(),
        }
    }
}

/// A response paired with the verdict it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalyzedResponse {
    /// Question answered.
    pub question: QuestionDetails,
    /// Transcribed answer.
    pub response_text: String,
    /// Verdict for the answer.
    pub analysis: ResponseAnalysis,
}

/// Input for the holistic interview assessment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OverallAnalysisRequest {
    /// Candidate under evaluation.
    pub candidate_profile: CandidateProfile,
    /// Job the candidate applied for.
    pub job_profile: JobProfile,
    /// Every response with its verdict.
    pub responses: Vec<AnalyzedResponse>,
    /// Interview facts.
    pub interview_metadata: InterviewMetadata,
}

/// Capability that scores responses and whole interviews.
///
/// Implementations apply their own retry policy and return structurally
/// valid fallback values when the model output is unusable; errors are
/// reserved for calls that could not be completed at all.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    /// Scores a single response.
    async fn analyze_response(
        &self,
        request: &ResponseAnalysisRequest,
    ) -> Result<ResponseAnalysis, AnalysisBackendError>;

    /// Produces the overall interview assessment.
    async fn analyze_overall(
        &self,
        request: &OverallAnalysisRequest,
    ) -> Result<OverallAnalysis, AnalysisBackendError>;
}

/// Errors returned by AI backend adapters.
#[derive(Debug, Clone, Error)]
pub enum AnalysisBackendError {
    /// The call did not finish within the allotted time.
    #[error("analysis backend timed out after {0:?}")]
    Timeout(Duration),

    /// The backend rejected the request or returned an error status.
    #[error("analysis backend rejected the request: {0}")]
    Rejected(String),

    /// Network or protocol failure.
    #[error("analysis backend transport error: {0}")]
    Transport(Arc<dyn std::error::Error + Send + Sync>),
}

impl AnalysisBackendError {
    /// Wraps a transport error.
    pub fn transport(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Transport(Arc::new(err))
    }
}
