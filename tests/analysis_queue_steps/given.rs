//! Given steps for analysis queue BDD scenarios.

use std::time::Duration;

use super::world::AnalysisQueueWorld;
use crate::test_helpers::{ScriptedBackend, TestSystem, fast_config};
use eyre::WrapErr;
use rstest_bdd_macros::given;

#[given("an analysis queue with {workers:usize} worker slots")]
fn analysis_queue(world: &mut AnalysisQueueWorld, workers: usize) -> Result<(), eyre::Report> {
    let system = TestSystem::new(
        ScriptedBackend::new(Duration::ZERO),
        fast_config().with_max_workers(workers),
    )
    .wrap_err("build worker manager for scenario")?;
    world.system = Some(system);
    Ok(())
}

#[given(r#"application "{application}" has {count:usize} interview responses"#)]
fn application_with_responses(
    world: &mut AnalysisQueueWorld,
    application: String,
    count: usize,
) -> Result<(), eyre::Report> {
    let answers: Vec<String> = (1..=count).map(|index| format!("answer {index}")).collect();
    let texts: Vec<&str> = answers.iter().map(String::as_str).collect();
    world.system()?.seed_application(&application, &texts)?;
    Ok(())
}

#[given("the analysis backend rejects overall assessments")]
fn backend_rejects_overall(world: &mut AnalysisQueueWorld) -> Result<(), eyre::Report> {
    world.system()?.backend.set_overall_failing(true);
    Ok(())
}
