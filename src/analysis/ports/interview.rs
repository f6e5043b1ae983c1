//! Data access port for applications and their interview responses.

use crate::analysis::domain::{
    AnalysisResults, ApplicationId, InterviewContext, InterviewResponse, OverallAnalysis,
    ResponseAnalysis, ResponseId,
};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Result type for interview data operations.
pub type InterviewRepositoryResult<T> = Result<T, InterviewRepositoryError>;

/// Read and write access to the interview data the pipeline analyses.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InterviewRepository: Send + Sync {
    /// Returns every response recorded for the application, in interview
    /// order. An empty list is not an error.
    async fn fetch_responses(
        &self,
        application_id: &ApplicationId,
    ) -> InterviewRepositoryResult<Vec<InterviewResponse>>;

    /// Returns candidate, job and interview context for the application.
    ///
    /// # Errors
    ///
    /// Returns [`InterviewRepositoryError::ApplicationNotFound`] when the
    /// application does not exist.
    async fn fetch_context(
        &self,
        application_id: &ApplicationId,
    ) -> InterviewRepositoryResult<InterviewContext>;

    /// Stores the verdict for one response, replacing any earlier one.
    async fn save_response_analysis(
        &self,
        response_id: &ResponseId,
        analysis: &ResponseAnalysis,
    ) -> InterviewRepositoryResult<()>;

    /// Mirrors the overall verdict and score onto the application record.
    async fn save_overall_analysis(
        &self,
        application_id: &ApplicationId,
        analysis: &OverallAnalysis,
        results: &AnalysisResults,
    ) -> InterviewRepositoryResult<()>;
}

/// Errors returned by interview data adapters.
#[derive(Debug, Clone, Error)]
pub enum InterviewRepositoryError {
    /// The application does not exist.
    #[error("application not found: {0}")]
    ApplicationNotFound(ApplicationId),

    /// The response does not exist.
    #[error("interview response not found: {0}")]
    ResponseNotFound(ResponseId),

    /// Persistence-layer failure.
    #[error("persistence error: {0}")]
    Persistence(Arc<dyn std::error::Error + Send + Sync>),
}

impl InterviewRepositoryError {
    /// Wraps a persistence error.
    pub fn persistence(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Persistence(Arc::new(err))
    }
}
