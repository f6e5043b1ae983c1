//! Start-up recovery, pending rescans and draining shutdown.

use std::time::Duration;

use super::events::{collect_until, is_terminal_for};
use crate::test_helpers::{ScriptedBackend, TestSystem, fast_config, wait_for_task};
use eyre::ensure;
use interview_analysis::analysis::{
    domain::{
        AnalysisTask, ApplicationId, TaskErrorCode, TaskPriority, TaskStatus, WorkerId,
        WorkspaceId,
    },
    ports::AnalysisTaskRepository,
    services::AnalysisEvent,
};
use mockable::DefaultClock;
use rstest::rstest;

fn stored_task(application_id: ApplicationId) -> eyre::Result<AnalysisTask> {
    Ok(AnalysisTask::new(
        application_id,
        WorkspaceId::new("ws-1")?,
        TaskPriority::Normal,
        3,
        &DefaultClock,
    ))
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn orphaned_processing_task_is_failed_and_retried() -> eyre::Result<()> {
    let system = TestSystem::new(ScriptedBackend::new(Duration::ZERO), fast_config())?;
    let application_id = system.seed_application("app-1", &["first", "second"])?;
    let mut orphan = stored_task(application_id)?;
    orphan.claim(WorkerId::for_slot(9), &DefaultClock)?;
    system.tasks.store(&orphan).await?;
    let mut events = system.manager.subscribe();

    system.manager.start().await?;
    let seen = collect_until(&mut events, |event| is_terminal_for(event, orphan.id())).await?;

    let first_failure = seen.iter().find_map(|event| match event {
        AnalysisEvent::Failed { error, retry, .. } => Some((error.code, *retry)),
        _ => None,
    });
    ensure!(first_failure == Some((TaskErrorCode::WorkerLost, true)));
    ensure!(matches!(seen.last(), Some(AnalysisEvent::Completed { .. })));
    let task = wait_for_task(&system.manager, orphan.id(), |task| {
        task.status() == TaskStatus::Completed
    })
    .await?;
    ensure!(task.retry_count() == 1);
    ensure!(task.worker_id() != Some(&WorkerId::for_slot(9)));
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn stored_pending_task_is_queued_on_start() -> eyre::Result<()> {
    let system = TestSystem::new(ScriptedBackend::new(Duration::ZERO), fast_config())?;
    let application_id = system.seed_application("app-1", &["answer"])?;
    let pending = stored_task(application_id)?;
    system.tasks.store(&pending).await?;

    system.manager.start().await?;

    wait_for_task(&system.manager, pending.id(), |task| {
        task.status() == TaskStatus::Completed
    })
    .await?;
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn rescan_picks_up_tasks_stored_by_other_processes() -> eyre::Result<()> {
    let system = TestSystem::new(
        ScriptedBackend::new(Duration::ZERO),
        fast_config().with_pending_rescan_interval(Some(Duration::from_millis(20))),
    )?;
    let application_id = system.seed_application("app-1", &["answer"])?;
    system.manager.start().await?;

    let external = stored_task(application_id)?;
    system.tasks.store(&external).await?;

    wait_for_task(&system.manager, external.id(), |task| {
        task.status() == TaskStatus::Completed
    })
    .await?;
    system.manager.shutdown().await;
    Ok(())
}

#[rstest]
#[tokio::test(flavor = "multi_thread")]
async fn shutdown_lets_running_work_finish() -> eyre::Result<()> {
    let system = TestSystem::new(ScriptedBackend::new(Duration::from_millis(50)), fast_config())?;
    let application_id = system.seed_application("app-1", &["first", "second"])?;
    let task = stored_task(application_id)?;
    system.tasks.store(&task).await?;
    system.manager.start().await?;
    wait_for_task(&system.manager, task.id(), |current| {
        current.status() == TaskStatus::Processing
    })
    .await?;

    system.manager.shutdown().await;

    let stats = system.manager.get_queue_stats().await?;
    let finished = system
        .manager
        .get_task(task.id())
        .await?
        .ok_or_else(|| eyre::eyre!("task must exist"))?;
    ensure!(finished.status() == TaskStatus::Completed);
    ensure!(stats.processing_count == 0);
    ensure!(stats.active_workers == 0);
    Ok(())
}
