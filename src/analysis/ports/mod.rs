//! Port contracts for background interview analysis.
//!
//! Ports define infrastructure-agnostic interfaces used by analysis services.

pub mod analyzer;
pub mod interview;
pub mod repository;

pub use analyzer::{
    AnalysisBackend, AnalysisBackendError, AnalyzedResponse, OverallAnalysisRequest,
    ResponseAnalysisRequest,
};
pub use interview::{InterviewRepository, InterviewRepositoryError, InterviewRepositoryResult};
pub use repository::{AnalysisTaskRepository, TaskRepositoryError, TaskRepositoryResult};

#[cfg(test)]
pub use analyzer::MockAnalysisBackend;
#[cfg(test)]
pub use interview::MockInterviewRepository;
#[cfg(test)]
pub use repository::MockAnalysisTaskRepository;
