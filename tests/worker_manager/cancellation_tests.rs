//! Cancelling pending and running tasks.

use std::time::Duration;

use super::events::{collect_until, is_terminal_for};
use crate::test_helpers::{ScriptedBackend, TestSystem, fast_config, wait_for_task};
use eyre::ensure;
use interview_analysis::analysis::{
    domain::{PipelineStep, TaskId, TaskStatus},
    services::{
        AnalysisEvent, CancelOutcome, QueueAnalysisRequest, QueueDisposition, WorkerManagerError,
    },
};
use rstest::{fixture, rstest};

#[fixture]
fn idle_system() -> eyre::Result<TestSystem> {
    TestSystem::new(ScriptedBackend::new(Duration::ZERO), fast_config())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn pending_task_is_cancelled_immediately(
    idle_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = idle_system?;
    system.seed_application("app-1", &["answer"])?;
    let mut events = system.manager.subscribe();
    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;

    let outcome = system.manager.cancel_task(&queued.task_id).await?;

    ensure!(outcome == CancelOutcome::Cancelled);
    let task = system
        .manager
        .get_task(&queued.task_id)
        .await?
        .ok_or_else(|| eyre::eyre!("task must exist"))?;
    ensure!(task.status() == TaskStatus::Cancelled);
    ensure!(matches!(
        events.try_recv(),
        Ok(AnalysisEvent::Cancelled { task_id }) if task_id == queued.task_id
    ));

    let again = system.manager.cancel_task(&queued.task_id).await;
    ensure!(matches!(
        again,
        Err(WorkerManagerError::NotCancellable {
            status: TaskStatus::Cancelled,
            ..
        })
    ));

    let resubmitted = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;
    ensure!(resubmitted.disposition == QueueDisposition::Created);
    ensure!(resubmitted.task_id != queued.task_id);
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn cancelled_pending_task_is_never_dispatched(
    idle_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = idle_system?;
    system.seed_application("app-1", &["answer"])?;
    system.seed_application("app-2", &["answer"])?;
    let dropped = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;
    let kept = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-2", "ws-1"))
        .await?;
    system.manager.cancel_task(&dropped.task_id).await?;

    system.manager.start().await?;
    wait_for_task(&system.manager, &kept.task_id, |task| {
        task.status() == TaskStatus::Completed
    })
    .await?;

    ensure!(system.backend.overall_calls() == 1);
    let task = system
        .manager
        .get_task(&dropped.task_id)
        .await?
        .ok_or_else(|| eyre::eyre!("task must exist"))?;
    ensure!(task.status() == TaskStatus::Cancelled);
    ensure!(task.worker_id().is_none());
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn running_task_stops_at_its_next_checkpoint() -> eyre::Result<()> {
    let system = TestSystem::new(ScriptedBackend::new(Duration::from_millis(150)), fast_config())?;
    system.seed_application("app-1", &["first", "second", "third"])?;
    let mut events = system.manager.subscribe();
    system.manager.start().await?;
    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;
    collect_until(&mut events, |event| {
        matches!(
            event,
            AnalysisEvent::Progress {
                step: PipelineStep::AnalyzingIndividual,
                ..
            }
        )
    })
    .await?;

    let outcome = system.manager.cancel_task(&queued.task_id).await?;
    let seen = collect_until(&mut events, |event| is_terminal_for(event, &queued.task_id)).await?;

    ensure!(outcome == CancelOutcome::Requested);
    ensure!(matches!(seen.last(), Some(AnalysisEvent::Cancelled { .. })));
    let task = wait_for_task(&system.manager, &queued.task_id, |task| {
        task.status() == TaskStatus::Cancelled
    })
    .await?;
    ensure!(task.results().is_none());
    ensure!(system.backend.overall_calls() == 0);
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn attempt_failing_after_cancel_request_ends_cancelled() -> eyre::Result<()> {
    let system = TestSystem::new(ScriptedBackend::new(Duration::from_millis(200)), fast_config())?;
    system.seed_application("app-1", &["bad first", "bad second"])?;
    let mut events = system.manager.subscribe();
    system.manager.start().await?;
    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;
    collect_until(&mut events, |event| {
        matches!(
            event,
            AnalysisEvent::Progress {
                step: PipelineStep::AnalyzingIndividual,
                current: None,
                ..
            }
        )
    })
    .await?;

    let outcome = system.manager.cancel_task(&queued.task_id).await?;
    let seen = collect_until(&mut events, |event| is_terminal_for(event, &queued.task_id)).await?;

    ensure!(outcome == CancelOutcome::Requested);
    ensure!(
        matches!(seen.last(), Some(AnalysisEvent::Cancelled { .. })),
        "expected cancellation, saw {seen:?}"
    );
    ensure!(
        !seen
            .iter()
            .any(|event| matches!(event, AnalysisEvent::Failed { .. }))
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    let task = system
        .manager
        .get_task(&queued.task_id)
        .await?
        .ok_or_else(|| eyre::eyre!("task must exist"))?;
    ensure!(task.status() == TaskStatus::Cancelled);
    ensure!(task.retry_count() == 0);
    ensure!(system.backend.overall_calls() == 0);
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn unknown_task_cannot_be_cancelled(
    idle_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = idle_system?;
    let missing = TaskId::new("analysis_app-9_0_missing")?;

    let result = system.manager.cancel_task(&missing).await;

    ensure!(matches!(result, Err(WorkerManagerError::TaskNotFound(_))));
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn only_failed_tasks_can_be_retried(
    idle_system: eyre::Result<TestSystem>,
) -> eyre::Result<()> {
    let system = idle_system?;
    let queued = system
        .manager
        .queue_analysis_task(QueueAnalysisRequest::new("app-1", "ws-1"))
        .await?;

    let result = system.manager.retry_task(&queued.task_id).await;

    ensure!(matches!(
        result,
        Err(WorkerManagerError::NotRetryable {
            status: TaskStatus::Pending,
            ..
        })
    ));
    Ok(())
}
