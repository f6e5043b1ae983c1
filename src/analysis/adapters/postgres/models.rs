//! Diesel row models for analysis persistence.

use super::schema::{analysis_tasks, applications, interview_responses};
use chrono::{DateTime, Utc};
use diesel::prelude::*;
use serde_json::Value;

/// Row of the `analysis_tasks` table, used for reads, inserts and updates.
#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = analysis_tasks)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct AnalysisTaskRow {
    /// Task identifier.
    pub id: String,
    /// Application under analysis.
    pub application_id: String,
    /// Owning workspace.
    pub workspace_id: String,
    /// Lifecycle status.
    pub status: String,
    /// Dequeue priority.
    pub priority: String,
    /// Total pipeline steps.
    pub total_steps: i32,
    /// Finished pipeline steps.
    pub completed_steps: i32,
    /// Step currently executing.
    pub current_step: Option<String>,
    /// When the current attempt was queued.
    pub queued_at: DateTime<Utc>,
    /// When the current attempt was claimed.
    pub started_at: Option<DateTime<Utc>>,
    /// When the current attempt ended.
    pub completed_at: Option<DateTime<Utc>>,
    /// Successful attempt duration in milliseconds.
    pub duration_ms: Option<i64>,
    /// Estimated completion of the current attempt.
    pub estimated_completion: Option<DateTime<Utc>>,
    /// Failure record JSON.
    pub error: Option<Value>,
    /// Failed attempts so far.
    pub retry_count: i32,
    /// Attempt budget.
    pub max_retries: i32,
    /// Worker owning the current attempt.
    pub worker_id: Option<String>,
    /// Results JSON.
    pub results: Option<Value>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Query result row for application context.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = applications)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ApplicationContextRow {
    /// Application identifier.
    pub id: String,
    /// Candidate profile JSON.
    pub candidate: Value,
    /// Job profile JSON.
    pub job: Value,
    /// Interview metadata JSON.
    pub interview_metadata: Value,
}

/// Query result row for interview responses.
#[derive(Debug, Clone, Queryable, Selectable)]
#[diesel(table_name = interview_responses)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct InterviewResponseRow {
    /// Response identifier.
    pub id: String,
    /// Question JSON.
    pub question: Value,
    /// Transcribed answer.
    pub response_text: String,
    /// Stored verdict JSON.
    pub analysis: Option<Value>,
}
