//! Claim, compare-and-set and active-task uniqueness against `PostgreSQL`.

use std::sync::Arc;

use crate::postgres::helpers::{TestDatabase, pending_task, test_runtime};
use eyre::ensure;
use interview_analysis::analysis::{
    domain::{TaskStatus, WorkerId},
    ports::{AnalysisTaskRepository, TaskRepositoryError},
};
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::TestCluster;
use pg_embedded_setup_unpriv::test_support::shared_test_cluster;
use rstest::rstest;
use tokio::task::JoinSet;

const CLAIMANTS: usize = 8;

#[rstest]
fn concurrent_claims_have_exactly_one_winner(
    shared_test_cluster: &'static TestCluster,
) -> eyre::Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "test_claim_race")?;
    let repo = Arc::new(database.repository()?);
    let task = pending_task("app-claim")?;
    let rt = test_runtime()?;
    rt.block_on(repo.store(&task))?;

    let claims = rt.block_on(async {
        let mut claimants = JoinSet::new();
        for slot in 1..=CLAIMANTS {
            let store = Arc::clone(&repo);
            let mut attempt = task.clone();
            claimants.spawn(async move {
                attempt.claim(WorkerId::for_slot(slot), &DefaultClock)?;
                let won = store.claim(&attempt).await?;
                Ok::<_, eyre::Report>((slot, won))
            });
        }
        let mut results = Vec::with_capacity(CLAIMANTS);
        while let Some(joined) = claimants.join_next().await {
            results.push(joined??);
        }
        Ok::<_, eyre::Report>(results)
    })?;

    let winners: Vec<usize> = claims
        .iter()
        .filter(|(_, won)| *won)
        .map(|(slot, _)| *slot)
        .collect();
    ensure!(claims.len() == CLAIMANTS);
    ensure!(winners.len() == 1, "winners: {winners:?}");

    let stored = rt
        .block_on(repo.find_by_id(task.id()))?
        .ok_or_else(|| eyre::eyre!("claimed task must exist"))?;
    ensure!(stored.status() == TaskStatus::Processing);
    let expected = winners
        .first()
        .map(|slot| WorkerId::for_slot(*slot))
        .ok_or_else(|| eyre::eyre!("no winning claim"))?;
    ensure!(stored.worker_id() == Some(&expected));
    Ok(())
}

#[rstest]
fn second_active_task_for_an_application_is_rejected(
    shared_test_cluster: &'static TestCluster,
) -> eyre::Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "test_active_unique")?;
    let repo = database.repository()?;
    let rt = test_runtime()?;
    let mut first = pending_task("app-busy")?;
    let second = pending_task("app-busy")?;
    rt.block_on(repo.store(&first))?;

    let rejected = rt.block_on(repo.store(&second));
    ensure!(
        matches!(
            &rejected,
            Err(TaskRepositoryError::ActiveTaskExists(application_id))
                if application_id == first.application_id()
        ),
        "expected ActiveTaskExists, got {rejected:?}"
    );

    let duplicate = rt.block_on(repo.store(&first));
    ensure!(
        matches!(duplicate, Err(TaskRepositoryError::ActiveTaskExists(_)))
            || matches!(duplicate, Err(TaskRepositoryError::DuplicateTask(_))),
        "expected a uniqueness error, got {duplicate:?}"
    );

    first.cancel(&DefaultClock)?;
    ensure!(rt.block_on(repo.update_if_status(&first, TaskStatus::Pending))?);
    rt.block_on(repo.store(&second))?;
    let active = rt
        .block_on(repo.find_active_for_application(first.application_id()))?
        .ok_or_else(|| eyre::eyre!("second task must now be active"))?;
    ensure!(active.id() == second.id());
    Ok(())
}

#[rstest]
fn compare_and_set_writes_nothing_on_status_mismatch(
    shared_test_cluster: &'static TestCluster,
) -> eyre::Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "test_cas_mismatch")?;
    let repo = database.repository()?;
    let rt = test_runtime()?;
    let task = pending_task("app-cas")?;
    rt.block_on(repo.store(&task))?;

    let mut claimed = task.clone();
    claimed.claim(WorkerId::for_slot(1), &DefaultClock)?;
    let written = rt.block_on(repo.update_if_status(&claimed, TaskStatus::Processing))?;

    ensure!(!written);
    let stored = rt
        .block_on(repo.find_by_id(task.id()))?
        .ok_or_else(|| eyre::eyre!("task must exist"))?;
    ensure!(stored.status() == TaskStatus::Pending);
    ensure!(stored.worker_id().is_none());

    ensure!(rt.block_on(repo.update_if_status(&claimed, TaskStatus::Pending))?);
    let counted = rt.block_on(repo.count_by_status(TaskStatus::Processing))?;
    ensure!(counted == 1);
    Ok(())
}

#[rstest]
fn compare_and_set_on_a_missing_task_reports_not_found(
    shared_test_cluster: &'static TestCluster,
) -> eyre::Result<()> {
    let database = TestDatabase::create(shared_test_cluster, "test_cas_missing")?;
    let repo = database.repository()?;
    let rt = test_runtime()?;
    let task = pending_task("app-missing")?;

    let result = rt.block_on(repo.update_if_status(&task, TaskStatus::Pending));

    ensure!(
        matches!(&result, Err(TaskRepositoryError::NotFound(id)) if id == task.id()),
        "expected NotFound, got {result:?}"
    );
    Ok(())
}
