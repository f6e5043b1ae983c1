//! When steps for analysis queue BDD scenarios.

use super::world::{AnalysisQueueWorld, run_async};
use eyre::WrapErr;
use interview_analysis::analysis::services::QueueAnalysisRequest;
use rstest_bdd_macros::when;

#[when("the worker manager starts")]
fn manager_starts(world: &mut AnalysisQueueWorld) -> Result<(), eyre::Report> {
    run_async(world.system()?.manager.start()).wrap_err("start worker manager")?;
    Ok(())
}

#[when(r#"analysis is requested for application "{application}""#)]
fn analysis_requested(
    world: &mut AnalysisQueueWorld,
    application: String,
) -> Result<(), eyre::Report> {
    let queued = run_async(
        world
            .system()?
            .manager
            .queue_analysis_task(QueueAnalysisRequest::new(application, "ws-1")),
    )
    .wrap_err("queue analysis task")?;
    world.submissions.push(queued);
    Ok(())
}

#[when("the latest task is cancelled")]
fn latest_task_cancelled(world: &mut AnalysisQueueWorld) -> Result<(), eyre::Report> {
    let task_id = world.latest_task_id()?.clone();
    run_async(world.system()?.manager.cancel_task(&task_id)).wrap_err("cancel task")?;
    Ok(())
}

#[when("a manual retry is requested")]
fn manual_retry_requested(world: &mut AnalysisQueueWorld) -> Result<(), eyre::Report> {
    let task_id = world.latest_task_id()?.clone();
    let result = run_async(world.system()?.manager.retry_task(&task_id));
    world.last_retry = Some(result);
    Ok(())
}
