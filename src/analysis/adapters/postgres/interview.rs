//! `PostgreSQL` access to the host platform's applications and responses.

use super::{
    models::{ApplicationContextRow, InterviewResponseRow},
    repository::AnalysisPgPool,
    schema::{applications, interview_responses},
};
use crate::analysis::{
    domain::{
        AnalysisResults, ApplicationId, InterviewContext, InterviewResponse, OverallAnalysis,
        ResponseAnalysis, ResponseId,
    },
    ports::{InterviewRepository, InterviewRepositoryError, InterviewRepositoryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;

/// `PostgreSQL`-backed interview data repository.
#[derive(Debug, Clone)]
pub struct PostgresInterviewRepository {
    pool: AnalysisPgPool,
}

impl PostgresInterviewRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: AnalysisPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> InterviewRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> InterviewRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(InterviewRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(InterviewRepositoryError::persistence)?
    }
}

#[async_trait]
impl InterviewRepository for PostgresInterviewRepository {
    async fn fetch_responses(
        &self,
        application_id: &ApplicationId,
    ) -> InterviewRepositoryResult<Vec<InterviewResponse>> {
        let lookup_id = application_id.clone();
        self.run_blocking(move |connection| {
            let rows = interview_responses::table
                .filter(interview_responses::application_id.eq(lookup_id.as_str()))
                .order(interview_responses::position.asc())
                .select(InterviewResponseRow::as_select())
                .load::<InterviewResponseRow>(connection)
                .map_err(InterviewRepositoryError::persistence)?;
            rows.into_iter().map(row_to_response).collect()
        })
        .await
    }

    async fn fetch_context(
        &self,
        application_id: &ApplicationId,
    ) -> InterviewRepositoryResult<InterviewContext> {
        let lookup_id = application_id.clone();
        self.run_blocking(move |connection| {
            let row = applications::table
                .find(lookup_id.as_str())
                .select(ApplicationContextRow::as_select())
                .first::<ApplicationContextRow>(connection)
                .optional()
                .map_err(InterviewRepositoryError::persistence)?
                .ok_or_else(|| InterviewRepositoryError::ApplicationNotFound(lookup_id.clone()))?;
            Ok(InterviewContext {
                candidate: serde_json::from_value(row.candidate)
                    .map_err(InterviewRepositoryError::persistence)?,
                job: serde_json::from_value(row.job)
                    .map_err(InterviewRepositoryError::persistence)?,
                metadata: serde_json::from_value(row.interview_metadata)
                    .map_err(InterviewRepositoryError::persistence)?,
            })
        })
        .await
    }

    async fn save_response_analysis(
        &self,
        response_id: &ResponseId,
        analysis: &ResponseAnalysis,
    ) -> InterviewRepositoryResult<()> {
        let target_id = response_id.clone();
        let payload =
            serde_json::to_value(analysis).map_err(InterviewRepositoryError::persistence)?;
        self.run_blocking(move |connection| {
            let updated = diesel::update(interview_responses::table.find(target_id.as_str()))
                .set(interview_responses::analysis.eq(Some(payload)))
                .execute(connection)
                .map_err(InterviewRepositoryError::persistence)?;
            if updated == 0 {
                return Err(InterviewRepositoryError::ResponseNotFound(target_id));
            }
            Ok(())
        })
        .await
    }

    async fn save_overall_analysis(
        &self,
        application_id: &ApplicationId,
        analysis: &OverallAnalysis,
        results: &AnalysisResults,
    ) -> InterviewRepositoryResult<()> {
        let target_id = application_id.clone();
        let payload =
            serde_json::to_value(analysis).map_err(InterviewRepositoryError::persistence)?;
        let overall_score = i16::from(analysis.overall_score);
        let average_score = results.average_score;
        self.run_blocking(move |connection| {
            let updated = diesel::update(applications::table.find(target_id.as_str()))
                .set((
                    applications::overall_score.eq(Some(overall_score)),
                    applications::average_score.eq(Some(average_score)),
                    applications::ai_analysis.eq(Some(payload)),
                ))
                .execute(connection)
                .map_err(InterviewRepositoryError::persistence)?;
            if updated == 0 {
                return Err(InterviewRepositoryError::ApplicationNotFound(target_id));
            }
            Ok(())
        })
        .await
    }
}

fn row_to_response(row: InterviewResponseRow) -> InterviewRepositoryResult<InterviewResponse> {
    Ok(InterviewResponse {
        id: ResponseId::new(row.id),
        question: serde_json::from_value(row.question)
            .map_err(InterviewRepositoryError::persistence)?,
        response_text: row.response_text,
        analysis: row
            .analysis
            .map(serde_json::from_value)
            .transpose()
            .map_err(InterviewRepositoryError::persistence)?,
    })
}
