//! Diesel schema for analysis persistence.

diesel::table! {
    /// Background analysis tasks, one row per submission.
    analysis_tasks (id) {
        /// Task identifier.
        #[max_length = 255]
        id -> Varchar,
        /// Application under analysis.
        #[max_length = 255]
        application_id -> Varchar,
        /// Owning workspace.
        #[max_length = 255]
        workspace_id -> Varchar,
        /// Lifecycle status.
        #[max_length = 20]
        status -> Varchar,
        /// Dequeue priority.
        #[max_length = 10]
        priority -> Varchar,
        /// Total pipeline steps.
        total_steps -> Int4,
        /// Finished pipeline steps.
        completed_steps -> Int4,
        /// Step currently executing.
        #[max_length = 50]
        current_step -> Nullable<Varchar>,
        /// When the current attempt was queued.
        queued_at -> Timestamptz,
        /// When the current attempt was claimed.
        started_at -> Nullable<Timestamptz>,
        /// When the current attempt ended.
        completed_at -> Nullable<Timestamptz>,
        /// Successful attempt duration in milliseconds.
        duration_ms -> Nullable<Int8>,
        /// Estimated completion of the current attempt.
        estimated_completion -> Nullable<Timestamptz>,
        /// Failure record.
        error -> Nullable<Jsonb>,
        /// Failed attempts so far.
        retry_count -> Int4,
        /// Attempt budget.
        max_retries -> Int4,
        /// Worker owning the current attempt.
        #[max_length = 255]
        worker_id -> Nullable<Varchar>,
        /// Results of a completed analysis.
        results -> Nullable<Jsonb>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Interview applications owned by the host platform.
    applications (id) {
        /// Application identifier.
        #[max_length = 255]
        id -> Varchar,
        /// Candidate profile JSON.
        candidate -> Jsonb,
        /// Job profile JSON.
        job -> Jsonb,
        /// Interview metadata JSON.
        interview_metadata -> Jsonb,
        /// Overall score mirrored from the latest analysis.
        overall_score -> Nullable<Int2>,
        /// Mean individual response score.
        average_score -> Nullable<Float8>,
        /// Overall verdict JSON.
        ai_analysis -> Nullable<Jsonb>,
    }
}

diesel::table! {
    /// Candidate answers to interview questions.
    interview_responses (id) {
        /// Response identifier.
        #[max_length = 255]
        id -> Varchar,
        /// Owning application.
        #[max_length = 255]
        application_id -> Varchar,
        /// Position within the interview.
        position -> Int4,
        /// Question JSON.
        question -> Jsonb,
        /// Transcribed answer.
        response_text -> Text,
        /// Stored verdict JSON.
        analysis -> Nullable<Jsonb>,
    }
}
