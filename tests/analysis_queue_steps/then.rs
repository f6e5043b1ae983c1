//! Then steps for analysis queue BDD scenarios.

use super::world::{AnalysisQueueWorld, run_async};
use crate::test_helpers::wait_for_task;
use interview_analysis::analysis::{
    domain::{AnalysisDomainError, AnalysisTask, ApplicationId, TaskStatus},
    services::WorkerManagerError,
};
use rstest_bdd_macros::then;

fn settled_task(
    world: &AnalysisQueueWorld,
    expected: TaskStatus,
) -> Result<AnalysisTask, eyre::Report> {
    let system = world.system()?;
    let task_id = world.latest_task_id()?;
    run_async(wait_for_task(&system.manager, task_id, |task| {
        // A failed task with attempts left is about to be re-queued.
        task.status() == expected && !(expected == TaskStatus::Failed && task.can_retry())
    }))
}

#[then(r#"the task settles in status "{status}""#)]
fn task_settles(world: &AnalysisQueueWorld, status: String) -> Result<(), eyre::Report> {
    let expected = TaskStatus::try_from(status.as_str())
        .map_err(|err| eyre::eyre!("invalid expected status in scenario: {err}"))?;
    settled_task(world, expected)?;
    Ok(())
}

#[then("the results contain {count:usize} individual scores")]
fn results_contain_scores(world: &AnalysisQueueWorld, count: usize) -> Result<(), eyre::Report> {
    let task = settled_task(world, TaskStatus::Completed)?;
    let results = task
        .results()
        .ok_or_else(|| eyre::eyre!("completed task has no results"))?;
    eyre::ensure!(
        results.individual_scores.len() == count,
        "expected {count} scores, found {}",
        results.individual_scores.len()
    );
    Ok(())
}

#[then("both submissions share one task")]
fn submissions_share_task(world: &AnalysisQueueWorld) -> Result<(), eyre::Report> {
    let (first, second) = match world.submissions.as_slice() {
        [first, second] => (first, second),
        other => return Err(eyre::eyre!("expected two submissions, found {}", other.len())),
    };
    eyre::ensure!(
        first.task_id == second.task_id,
        "submissions returned {} and {}",
        first.task_id,
        second.task_id
    );
    Ok(())
}

#[then(r#"application "{application}" has {count:usize} stored task"#)]
fn application_has_stored_tasks(
    world: &AnalysisQueueWorld,
    application: String,
    count: usize,
) -> Result<(), eyre::Report> {
    let application_id = ApplicationId::new(application)?;
    let stored = world.system()?.tasks.tasks_for_application(&application_id)?;
    eyre::ensure!(stored.len() == count, "found {} stored tasks", stored.len());
    Ok(())
}

#[then("the task has failed {count:u32} times")]
fn task_failed_times(world: &AnalysisQueueWorld, count: u32) -> Result<(), eyre::Report> {
    let task = settled_task(world, TaskStatus::Failed)?;
    eyre::ensure!(
        task.retry_count() == count,
        "expected retry count {count}, found {}",
        task.retry_count()
    );
    Ok(())
}

#[then("the backend received {count:usize} overall assessment requests")]
fn backend_received_requests(world: &AnalysisQueueWorld, count: usize) -> Result<(), eyre::Report> {
    let calls = world.system()?.backend.overall_calls();
    eyre::ensure!(calls == count, "backend received {calls} overall requests");
    Ok(())
}

#[then("the retry is refused because the attempt budget is spent")]
fn retry_refused(world: &AnalysisQueueWorld) -> Result<(), eyre::Report> {
    let result = world
        .last_retry
        .as_ref()
        .ok_or_else(|| eyre::eyre!("missing retry result"))?;
    if !matches!(
        result,
        Err(WorkerManagerError::Domain(
            AnalysisDomainError::RetryLimitReached { .. }
        ))
    ) {
        return Err(eyre::eyre!("expected RetryLimitReached, got {result:?}"));
    }
    Ok(())
}
