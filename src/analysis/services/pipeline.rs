//! Per-task analysis pipeline executed by a worker.
//!
//! A claimed task walks through four steps. Each step boundary is a
//! checkpoint: cancellation is observed and progress is written with a
//! compare-and-set against `processing`, so a task that was cancelled or
//! reassigned elsewhere is never overwritten.

use super::{AnalysisEvent, EventPublisher, WorkerManagerConfig};
use crate::analysis::{
    domain::{
        AnalysisDomainError, AnalysisResults, AnalysisTask, ApplicationId, IndividualScore,
        InterviewContext, InterviewResponse, OverallAnalysis, PipelineStep, ResponseAnalysis,
        TaskError, TaskErrorCode, TaskId, TaskStatus,
    },
    ports::{
        AnalysisBackend, AnalysisBackendError, AnalysisTaskRepository, AnalyzedResponse,
        InterviewRepository, InterviewRepositoryError, OverallAnalysisRequest,
        ResponseAnalysisRequest, TaskRepositoryError,
    },
};
use chrono::TimeDelta;
use mockable::Clock;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Reasons a pipeline run stops before completion.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The owning worker was asked to stop.
    #[error("analysis was cancelled")]
    Cancelled,

    /// The stored task left `processing` while the worker held it.
    #[error("task {0} was changed by another writer")]
    Superseded(TaskId),

    /// The application has nothing to analyse.
    #[error("application {0} has no interview responses")]
    NoResponses(ApplicationId),

    /// More response analyses failed than the configured threshold allows.
    #[error("{failed} of {attempted} response analyses failed")]
    TooManyResponseFailures {
        /// Failed analyses.
        failed: usize,
        /// Analyses attempted in this run.
        attempted: usize,
    },

    /// An AI backend call exceeded the step timeout.
    #[error("analysis backend did not answer within {0:?}")]
    Timeout(Duration),

    /// The AI backend failed.
    #[error(transparent)]
    Backend(#[from] AnalysisBackendError),

    /// Task persistence failed.
    #[error(transparent)]
    Tasks(#[from] TaskRepositoryError),

    /// Interview data access failed.
    #[error(transparent)]
    Interviews(#[from] InterviewRepositoryError),

    /// The task aggregate rejected a change.
    #[error(transparent)]
    Domain(#[from] AnalysisDomainError),
}

impl PipelineError {
    /// Classifies the error for the task's failure record.
    #[must_use]
    pub const fn code(&self) -> TaskErrorCode {
        match self {
            Self::NoResponses(_) => TaskErrorCode::NoResponses,
            Self::TooManyResponseFailures { .. } => TaskErrorCode::TooManyResponseFailures,
            Self::Timeout(_) | Self::Backend(AnalysisBackendError::Timeout(_)) => {
                TaskErrorCode::BackendTimeout
            }
            Self::Backend(_) => TaskErrorCode::BackendFailure,
            Self::Tasks(_) | Self::Interviews(_) => TaskErrorCode::StorageFailure,
            Self::Cancelled | Self::Superseded(_) | Self::Domain(_) => TaskErrorCode::Internal,
        }
    }
}

/// How a pipeline run ended.
#[derive(Debug)]
pub enum PipelineOutcome {
    /// The task was completed and persisted.
    Completed(AnalysisTask),
    /// The worker observed its cancellation token; the task is still
    /// `processing` in the store.
    Cancelled(AnalysisTask),
    /// Another writer moved the task out of `processing`.
    Superseded(AnalysisTask),
    /// The attempt failed; the task is still `processing` in the store.
    Failed {
        /// Task as last written by the worker.
        task: AnalysisTask,
        /// Failure to record.
        error: TaskError,
    },
}

/// Executes the analysis steps for claimed tasks.
pub struct AnalysisPipeline<R, I, B, C>
where
    R: AnalysisTaskRepository,
    I: InterviewRepository,
    B: AnalysisBackend,
    C: Clock + Send + Sync,
{
    tasks: Arc<R>,
    interviews: Arc<I>,
    backend: Arc<B>,
    clock: Arc<C>,
    events: EventPublisher,
    config: WorkerManagerConfig,
}

impl<R, I, B, C> AnalysisPipeline<R, I, B, C>
where
    R: AnalysisTaskRepository,
    I: InterviewRepository,
    B: AnalysisBackend,
    C: Clock + Send + Sync,
{
    /// Creates a pipeline over the given collaborators.
    #[must_use]
    pub const fn new(
        tasks: Arc<R>,
        interviews: Arc<I>,
        backend: Arc<B>,
        clock: Arc<C>,
        events: EventPublisher,
        config: WorkerManagerConfig,
    ) -> Self {
        Self {
            tasks,
            interviews,
            backend,
            clock,
            events,
            config,
        }
    }

    /// Runs a task that the caller has already claimed.
    pub async fn run(&self, task: AnalysisTask, cancel: &CancellationToken) -> PipelineOutcome {
        let mut current = task;
        match self.execute(&mut current, cancel).await {
            Ok(()) => PipelineOutcome::Completed(current),
            Err(PipelineError::Cancelled) => PipelineOutcome::Cancelled(current),
            Err(PipelineError::Superseded(_)) => PipelineOutcome::Superseded(current),
            Err(err) => {
                let error = TaskError::new(
                    err.code(),
                    err.to_string(),
                    current.progress().current_step(),
                )
                .with_source_chain(&err);
                PipelineOutcome::Failed {
                    task: current,
                    error,
                }
            }
        }
    }

    async fn execute(
        &self,
        task: &mut AnalysisTask,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        let clock = self.clock.as_ref();
        let application_id = task.application_id().clone();

        self.checkpoint(task, PipelineStep::FetchingResponses, cancel)
            .await?;
        let responses = self.interviews.fetch_responses(&application_id).await?;
        if responses.is_empty() {
            return Err(PipelineError::NoResponses(application_id));
        }
        let context = self.interviews.fetch_context(&application_id).await?;
        self.estimate_completion(task, &responses);
        task.finish_step(PipelineStep::FetchingResponses, clock)?;

        self.checkpoint(task, PipelineStep::AnalyzingIndividual, cancel)
            .await?;
        let analysed = self
            .analyze_individual(task.id(), &responses, &context)
            .await?;
        task.finish_step(PipelineStep::AnalyzingIndividual, clock)?;

        self.checkpoint(task, PipelineStep::AnalyzingOverall, cancel)
            .await?;
        let overall = self.analyze_overall(&context, &analysed).await?;
        task.finish_step(PipelineStep::AnalyzingOverall, clock)?;

        self.checkpoint(task, PipelineStep::SavingResults, cancel)
            .await?;
        let scores = analysed
            .iter()
            .map(|(response, analysis)| IndividualScore::from_analysis(response, analysis))
            .collect();
        let results = AnalysisResults::new(scores, overall.overall_score, clock.utc());
        self.interviews
            .save_overall_analysis(&application_id, &overall, &results)
            .await?;
        task.complete(results, clock)?;
        self.persist(task).await
    }

    async fn checkpoint(
        &self,
        task: &mut AnalysisTask,
        step: PipelineStep,
        cancel: &CancellationToken,
    ) -> Result<(), PipelineError> {
        if cancel.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        task.enter_step(step, self.clock.as_ref())?;
        self.persist(task).await?;
        info!(
            task_id = %task.id(),
            step = %step,
            percentage = task.progress().percentage(),
            "pipeline step started"
        );
        self.events.publish(AnalysisEvent::Progress {
            task_id: task.id().clone(),
            step,
            message: step.description().to_owned(),
            current: None,
            total: None,
        });
        Ok(())
    }

    async fn persist(&self, task: &AnalysisTask) -> Result<(), PipelineError> {
        if self
            .tasks
            .update_if_status(task, TaskStatus::Processing)
            .await?
        {
            Ok(())
        } else {
            Err(PipelineError::Superseded(task.id().clone()))
        }
    }

    fn estimate_completion(&self, task: &mut AnalysisTask, responses: &[InterviewResponse]) {
        let pending = responses
            .iter()
            .filter(|response| response.needs_analysis())
            .count();
        // One extra slot for the overall assessment.
        let units = i64::try_from(pending).unwrap_or(i64::MAX).saturating_add(1);
        let seconds = i64::from(self.config.estimated_seconds_per_response()).saturating_mul(units);
        let estimate = TimeDelta::try_seconds(seconds)
            .and_then(|delta| self.clock.utc().checked_add_signed(delta));
        if let Some(at) = estimate {
            task.estimate_completion(at);
        }
    }

    async fn analyze_individual(
        &self,
        task_id: &TaskId,
        responses: &[InterviewResponse],
        context: &InterviewContext,
    ) -> Result<Vec<(InterviewResponse, ResponseAnalysis)>, PipelineError> {
        let total = responses.len();
        let mut attempted = 0_usize;
        let mut failed = 0_usize;
        let mut analysed = Vec::with_capacity(total);

        for (index, response) in responses.iter().enumerate() {
            let analysis = match response.analysis.as_ref() {
                Some(existing) if existing.is_complete() => existing.clone(),
                _ => {
                    attempted += 1;
                    let analysis = self.analyze_one(task_id, response, context).await;
                    if analysis.is_fallback {
                        failed += 1;
                    }
                    self.interviews
                        .save_response_analysis(&response.id, &analysis)
                        .await?;
                    analysis
                }
            };
            let current = index + 1;
            self.events.publish(AnalysisEvent::Progress {
                task_id: task_id.clone(),
                step: PipelineStep::AnalyzingIndividual,
                message: format!("Analyzed response {current} of {total}"),
                current: Some(current),
                total: Some(total),
            });
            analysed.push((response.clone(), analysis));
        }

        let threshold = usize::from(self.config.failure_threshold_percent());
        if failed.saturating_mul(100) > attempted.saturating_mul(threshold) {
            return Err(PipelineError::TooManyResponseFailures { failed, attempted });
        }
        if failed > 0 {
            warn!(%task_id, failed, attempted, "some response analyses fell back");
        }
        Ok(analysed)
    }

    /// Scores one response, substituting a fallback verdict on failure.
    async fn analyze_one(
        &self,
        task_id: &TaskId,
        response: &InterviewResponse,
        context: &InterviewContext,
    ) -> ResponseAnalysis {
        let request = ResponseAnalysisRequest::for_response(response, context);
        let timeout = self.config.step_timeout();
        match tokio::time::timeout(timeout, self.backend.analyze_response(&request)).await {
            Ok(Ok(analysis)) => {
                debug!(%task_id, response_id = %response.id, fallback = analysis.is_fallback, "response analysed");
                analysis
            }
            Ok(Err(err)) => {
                warn!(%task_id, response_id = %response.id, error = %err, "response analysis failed");
                ResponseAnalysis::fallback(format!("Analysis unavailable: {err}"))
            }
            Err(_) => {
                warn!(%task_id, response_id = %response.id, ?timeout, "response analysis timed out");
                ResponseAnalysis::fallback("Analysis unavailable: the evaluator timed out.")
            }
        }
    }

    async fn analyze_overall(
        &self,
        context: &InterviewContext,
        analysed: &[(InterviewResponse, ResponseAnalysis)],
    ) -> Result<OverallAnalysis, PipelineError> {
        let request = OverallAnalysisRequest {
            candidate_profile: context.candidate.clone(),
            job_profile: context.job.clone(),
            responses: analysed
                .iter()
                .map(|(response, analysis)| AnalyzedResponse {
                    question: response.question.clone(),
                    response_text: response.response_text.clone(),
                    analysis: analysis.clone(),
                })
                .collect(),
            interview_metadata: context.metadata.clone(),
        };
        let timeout = self.config.step_timeout();
        tokio::time::timeout(timeout, self.backend.analyze_overall(&request))
            .await
            .map_err(|_| PipelineError::Timeout(timeout))?
            .map_err(PipelineError::from)
    }
}
