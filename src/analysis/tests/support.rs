//! Builders shared by the analysis unit tests.

use crate::analysis::domain::{
    AnalysisDomainError, AnalysisTask, ApplicationId, CandidateProfile, InterviewContext,
    InterviewMetadata, InterviewResponse, JobProfile, OverallAnalysis, QuestionDetails,
    Recommendation, ResponseAnalysis, ResponseId, TaskPriority, WorkspaceId,
};
use mockable::DefaultClock;

pub fn pending_task(
    application: &str,
    priority: TaskPriority,
    max_retries: u32,
) -> Result<AnalysisTask, AnalysisDomainError> {
    Ok(AnalysisTask::new(
        ApplicationId::new(application)?,
        WorkspaceId::new("ws-1")?,
        priority,
        max_retries,
        &DefaultClock,
    ))
}

pub fn response(id: &str, text: &str) -> InterviewResponse {
    InterviewResponse {
        id: ResponseId::new(id),
        question: QuestionDetails {
            id: format!("q-{id}"),
            text: format!("Question for {id}"),
            ..QuestionDetails::default()
        },
        response_text: text.to_owned(),
        analysis: None,
    }
}

pub fn context() -> InterviewContext {
    InterviewContext {
        candidate: CandidateProfile {
            name: "Robin Example".to_owned(),
            ..CandidateProfile::default()
        },
        job: JobProfile {
            title: "Platform Engineer".to_owned(),
            ..JobProfile::default()
        },
        metadata: InterviewMetadata::default(),
    }
}

pub fn scored(score: u8) -> ResponseAnalysis {
    ResponseAnalysis {
        overall_score: Some(score),
        summary: format!("scored {score}"),
        ..ResponseAnalysis::default()
    }
}

pub fn overall(score: u8) -> OverallAnalysis {
    OverallAnalysis {
        overall_score: score,
        recommendation: Recommendation::Hire,
        summary: "Consistent answers".to_owned(),
        ..OverallAnalysis::default()
    }
}
