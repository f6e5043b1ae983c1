//! Submission, completion, retry and statistics flows.

use std::time::Duration;

use super::events::{collect_until, is_terminal_for, steps_for};
use crate::test_helpers::{ScriptedBackend, TestSystem, fast_config, wait_for_task};
use eyre::{bail, ensure};
use interview_analysis::analysis::{
    domain::{AnalysisDomainError, PipelineStep, TaskErrorCode, TaskPriority, TaskStatus},
    services::{
        AnalysisEvent, QueueAnalysisRequest, QueueDisposition, QueueStats, WorkerManagerConfig,
        WorkerManagerError,
    },
};
use rstest::{fixture, rstest};

#[fixture]
fn built_system() -> eyre::Result<TestSystem> {
    TestSystem::new(ScriptedBackend::new(Duration::ZERO), fast_config())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn queued_analysis_runs_every_step_and_completes(
    built_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = built_system?;
    system.seed_application("app-1", &["first", "second", "third"])?;
    let mut events = system.manager.subscribe();
    system.manager.start().await?;

    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;
    let seen = collect_until(&mut events, |event| is_terminal_for(event, &queued.task_id)).await?;

    ensure!(queued.disposition == QueueDisposition::Created);
    ensure!(
        steps_for(&seen, &queued.task_id)
            == [
                PipelineStep::FetchingResponses,
                PipelineStep::AnalyzingIndividual,
                PipelineStep::AnalyzingOverall,
                PipelineStep::SavingResults,
            ]
    );
    let Some(AnalysisEvent::Completed { results, .. }) = seen.last() else {
        bail!("expected a completion event, saw {seen:?}");
    };
    ensure!(results.individual_scores.len() == 3);
    ensure!(results.overall_score == 78);

    let task = wait_for_task(&system.manager, &queued.task_id, |task| {
        task.status() == TaskStatus::Completed
    })
    .await?;
    ensure!(task.retry_count() == 0);
    ensure!(task.progress().percentage() == 100);
    ensure!(task.timing().duration_ms.is_some());
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn duplicate_submission_returns_the_active_task(
    built_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = built_system?;
    let application_id = system.seed_application("app-1", &["answer"])?;

    let first = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;
    let second = system
        .manager
        .queue_analysis_task(
            QueueAnalysisRequest::new("app-1", "ws-1").with_priority(TaskPriority::High),
        )
        .await?;

    ensure!(first.task_id == second.task_id);
    ensure!(first.disposition == QueueDisposition::Created);
    ensure!(second.disposition == QueueDisposition::AlreadyQueued);
    ensure!(second.position == Some(1));
    ensure!(system.tasks.tasks_for_application(&application_id)?.len() == 1);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn invalid_application_id_is_rejected(
    built_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = built_system?;
    let result = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("", "ws-1"))
        .await;
    ensure!(matches!(
        result,
        Err(WorkerManagerError::Domain(
            AnalysisDomainError::InvalidApplicationId(_)
        ))
    ));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn failing_task_is_retried_until_the_budget_is_spent(
    built_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = built_system?;
    system.seed_application("app-1", &["first", "second"])?;
    system.backend.set_overall_failing(true);
    let mut events = system.manager.subscribe();
    system.manager.start().await?;

    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1").with_max_retries(3))
        .await?;
    let seen = collect_until(&mut events, |event| is_terminal_for(event, &queued.task_id)).await?;

    let retry_flags: Vec<bool> = seen
        .iter()
        .filter_map(|event| match event {
            AnalysisEvent::Failed { retry, .. } => Some(*retry),
            _ => None,
        })
        .collect();
    ensure!(retry_flags == [true, true, false], "retry flags: {retry_flags:?}");
    ensure!(system.backend.overall_calls() == 3);

    let task = wait_for_task(&system.manager, &queued.task_id, |task| {
        task.status() == TaskStatus::Failed
    })
    .await?;
    ensure!(task.retry_count() == 3);
    let error = task
        .error()
        .ok_or_else(|| eyre::eyre!("failed task must carry an error"))?;
    ensure!(error.code == TaskErrorCode::BackendFailure);
    ensure!(error.step == Some(PipelineStep::AnalyzingOverall));

    let manual = system.manager.retry_task(&queued.task_id).await;
    ensure!(matches!(
        manual,
        Err(WorkerManagerError::Domain(
            AnalysisDomainError::RetryLimitReached { .. }
        ))
    ));
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn manual_retry_requeues_a_failed_task() -> eyre::Result<()> {
    let system = TestSystem::new(
        ScriptedBackend::new(Duration::ZERO),
        fast_config().with_auto_retry(false),
    )?;
    system.seed_application("app-1", &["only answer"])?;
    system.backend.set_overall_failing(true);
    system.manager.start().await?;

    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;
    let failed = wait_for_task(&system.manager, &queued.task_id, |task| {
        task.status() == TaskStatus::Failed
    })
    .await?;
    ensure!(failed.retry_count() == 1);

    system.backend.set_overall_failing(false);
    let scheduled = system.manager.retry_task(&queued.task_id).await?;
    ensure!(scheduled.retry_count == 1);
    ensure!(scheduled.delay == Duration::from_millis(10));

    let task = wait_for_task(&system.manager, &queued.task_id, |task| {
        task.status() == TaskStatus::Completed
    })
    .await?;
    ensure!(task.error().is_none());
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn zero_responses_fail_with_no_responses_code(
    built_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = built_system?;
    system.seed_application("app-1", &[])?;
    system.manager.start().await?;

    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1").with_max_retries(1))
        .await?;
    let task = wait_for_task(&system.manager, &queued.task_id, |task| {
        task.status() == TaskStatus::Failed
    })
    .await?;

    let error = task
        .error()
        .ok_or_else(|| eyre::eyre!("failed task must carry an error"))?;
    ensure!(error.code == TaskErrorCode::NoResponses);
    ensure!(error.step == Some(PipelineStep::FetchingResponses));
    ensure!(system.backend.overall_calls() == 0);
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn zero_responses_are_checked_again_on_retry() -> eyre::Result<()> {
    let system = TestSystem::new(
        ScriptedBackend::new(Duration::ZERO),
        fast_config()
            .with_retry_base_delay(Duration::from_millis(300))
            .with_max_retry_delay(Duration::from_secs(1)),
    )?;
    system.seed_application("app-1", &[])?;
    let mut events = system.manager.subscribe();
    system.manager.start().await?;

    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1").with_max_retries(3))
        .await?;
    let seen = collect_until(&mut events, |event| {
        matches!(event, AnalysisEvent::Failed { task_id, .. } if *task_id == queued.task_id)
    })
    .await?;
    let Some(AnalysisEvent::Failed { error, retry, .. }) = seen.last() else {
        bail!("expected a failure event, saw {seen:?}");
    };
    ensure!(error.code == TaskErrorCode::NoResponses);
    ensure!(*retry);

    system.seed_application("app-1", &["late answer"])?;
    let task = wait_for_task(&system.manager, &queued.task_id, |task| {
        task.status() == TaskStatus::Completed
    })
    .await?;

    ensure!(task.retry_count() == 1);
    ensure!(
        task.results()
            .is_some_and(|results| results.individual_scores.len() == 1)
    );
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn higher_priority_tasks_are_dispatched_first() -> eyre::Result<()> {
    let system = TestSystem::new(
        ScriptedBackend::new(Duration::ZERO),
        fast_config().with_max_workers(1),
    )?;
    for application in ["app-low", "app-normal", "app-high"] {
        system.seed_application(application, &["answer"])?;
    }
    let low = system
        .manager
        .queue_analysis_task(
            QueueAnalysisRequest::new("app-low", "ws-1").with_priority(TaskPriority::Low),
        )
        .await?;
    let normal = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-normal", "ws-1"))
        .await?;
    let high = system
        .manager
        .queue_analysis_task(
            QueueAnalysisRequest::new("app-high", "ws-1").with_priority(TaskPriority::High),
        )
        .await?;
    ensure!(high.position == Some(1));

    let mut events = system.manager.subscribe();
    system.manager.start().await?;
    let seen = collect_until(&mut events, |event| is_terminal_for(event, &low.task_id)).await?;

    let started: Vec<_> = seen
        .iter()
        .filter_map(|event| match event {
            AnalysisEvent::Progress {
                task_id,
                step: PipelineStep::FetchingResponses,
                ..
            } => Some(task_id.clone()),
            _ => None,
        })
        .collect();
    ensure!(started == [high.task_id, normal.task_id, low.task_id]);
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stats_count_stored_tasks_and_pool_size(
    built_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = built_system?;
    for application in ["app-1", "app-2"] {
        system
            .manager
            .queue_analysis_task(QueueAnalysisRequest::new(application, "ws-1"))
            .await?;
    }

    let stats = system.manager.get_queue_stats().await?;

    ensure!(
        stats
            == QueueStats {
                pending_count: 2,
                processing_count: 0,
                active_workers: 0,
                max_workers: 3,
            }
    );
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn start_is_refused_twice_and_after_shutdown(
    built_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = built_system?;
    system.manager.start().await?;
    ensure!(matches!(
        system.manager.start().await,
        Err(WorkerManagerError::AlreadyStarted)
    ));

    system.manager.shutdown().await;

    ensure!(matches!(
        system.manager.start().await,
        Err(WorkerManagerError::ShutDown)
    ));
    Ok(())
}

#[rstest]
fn zero_workers_are_rejected() {
    let result = TestSystem::new(
        ScriptedBackend::new(Duration::ZERO),
        WorkerManagerConfig::default().with_max_workers(0),
    );
    assert!(matches!(
        result
            .err()
            .and_then(|err| err.downcast::<WorkerManagerError>().ok()),
        Some(WorkerManagerError::InvalidConfig(_))
    ));
}
