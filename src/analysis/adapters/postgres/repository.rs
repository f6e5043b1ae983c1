//! `PostgreSQL` task store.

use super::{models::AnalysisTaskRow, schema::analysis_tasks};
use crate::analysis::{
    domain::{
        AnalysisTask, ApplicationId, PersistedAnalysisTaskData, PipelineStep, TaskId,
        TaskPriority, TaskProgress, TaskStatus, TaskTiming, WorkerId, WorkspaceId,
    },
    ports::{AnalysisTaskRepository, TaskRepositoryError, TaskRepositoryResult},
};
use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use diesel::result::{DatabaseErrorInformation, DatabaseErrorKind, Error as DieselError};

/// `PostgreSQL` connection pool type used by analysis adapters.
pub type AnalysisPgPool = Pool<ConnectionManager<PgConnection>>;

/// Partial unique index allowing one in-flight task per application.
const ACTIVE_APPLICATION_INDEX: &str = "idx_analysis_tasks_active_application";

/// Statuses covered by [`ACTIVE_APPLICATION_INDEX`].
const ACTIVE_STATUSES: [&str; 2] = [TaskStatus::Pending.as_str(), TaskStatus::Processing.as_str()];

/// `PostgreSQL`-backed task repository.
///
/// Claims and conditional updates are single `UPDATE … WHERE status = $n`
/// statements, so the database arbitrates concurrent workers.
#[derive(Debug, Clone)]
pub struct PostgresAnalysisTaskRepository {
    pool: AnalysisPgPool,
}

impl PostgresAnalysisTaskRepository {
    /// Creates a new repository from a `PostgreSQL` connection pool.
    #[must_use]
    pub const fn new(pool: AnalysisPgPool) -> Self {
        Self { pool }
    }

    async fn run_blocking<F, T>(&self, f: F) -> TaskRepositoryResult<T>
    where
        F: FnOnce(&mut PgConnection) -> TaskRepositoryResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let mut connection = pool.get().map_err(TaskRepositoryError::persistence)?;
            f(&mut connection)
        })
        .await
        .map_err(TaskRepositoryError::persistence)?
    }

    async fn write_if_status(
        &self,
        task: &AnalysisTask,
        expected: TaskStatus,
    ) -> TaskRepositoryResult<bool> {
        let task_id = task.id().clone();
        let application_id = task.application_id().clone();
        let row = to_row(task)?;

        self.run_blocking(move |connection| {
            let updated = diesel::update(
                analysis_tasks::table
                    .filter(analysis_tasks::id.eq(task_id.as_str()))
                    .filter(analysis_tasks::status.eq(expected.as_str())),
            )
            .set(&row)
            .execute(connection)
            .map_err(|err| map_write_error(err, &task_id, &application_id))?;

            if updated == 1 {
                return Ok(true);
            }
            ensure_exists(connection, &task_id)?;
            Ok(false)
        })
        .await
    }
}

#[async_trait]
impl AnalysisTaskRepository for PostgresAnalysisTaskRepository {
    async fn store(&self, task: &AnalysisTask) -> TaskRepositoryResult<()> {
        let task_id = task.id().clone();
        let application_id = task.application_id().clone();
        let row = to_row(task)?;

        self.run_blocking(move |connection| {
            diesel::insert_into(analysis_tasks::table)
                .values(&row)
                .execute(connection)
                .map_err(|err| map_write_error(err, &task_id, &application_id))?;
            Ok(())
        })
        .await
    }

    async fn find_by_id(&self, id: &TaskId) -> TaskRepositoryResult<Option<AnalysisTask>> {
        let task_id = id.clone();
        self.run_blocking(move |connection| {
            let row = analysis_tasks::table
                .filter(analysis_tasks::id.eq(task_id.as_str()))
                .select(AnalysisTaskRow::as_select())
                .first::<AnalysisTaskRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn find_active_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> TaskRepositoryResult<Option<AnalysisTask>> {
        let lookup_id = application_id.clone();
        self.run_blocking(move |connection| {
            let row = analysis_tasks::table
                .filter(analysis_tasks::application_id.eq(lookup_id.as_str()))
                .filter(analysis_tasks::status.eq_any(ACTIVE_STATUSES))
                .select(AnalysisTaskRow::as_select())
                .first::<AnalysisTaskRow>(connection)
                .optional()
                .map_err(TaskRepositoryError::persistence)?;
            row.map(row_to_task).transpose()
        })
        .await
    }

    async fn update(&self, task: &AnalysisTask) -> TaskRepositoryResult<()> {
        let task_id = task.id().clone();
        let application_id = task.application_id().clone();
        let row = to_row(task)?;

        self.run_blocking(move |connection| {
            let updated = diesel::update(analysis_tasks::table.find(task_id.as_str()))
                .set(&row)
                .execute(connection)
                .map_err(|err| map_write_error(err, &task_id, &application_id))?;
            if updated == 0 {
                return Err(TaskRepositoryError::NotFound(task_id));
            }
            Ok(())
        })
        .await
    }

    async fn update_if_status(
        &self,
        task: &AnalysisTask,
        expected: TaskStatus,
    ) -> TaskRepositoryResult<bool> {
        self.write_if_status(task, expected).await
    }

    async fn claim(&self, task: &AnalysisTask) -> TaskRepositoryResult<bool> {
        if task.status() != TaskStatus::Processing || task.worker_id().is_none() {
            return Ok(false);
        }
        self.write_if_status(task, TaskStatus::Pending).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> TaskRepositoryResult<Vec<AnalysisTask>> {
        self.run_blocking(move |connection| {
            let rows = analysis_tasks::table
                .filter(analysis_tasks::status.eq(status.as_str()))
                .order(analysis_tasks::queued_at.asc())
                .select(AnalysisTaskRow::as_select())
                .load::<AnalysisTaskRow>(connection)
                .map_err(TaskRepositoryError::persistence)?;
            rows.into_iter().map(row_to_task).collect()
        })
        .await
    }

    async fn count_by_status(&self, status: TaskStatus) -> TaskRepositoryResult<u64> {
        self.run_blocking(move |connection| {
            let count = analysis_tasks::table
                .filter(analysis_tasks::status.eq(status.as_str()))
                .count()
                .get_result::<i64>(connection)
                .map_err(TaskRepositoryError::persistence)?;
            u64::try_from(count).map_err(TaskRepositoryError::persistence)
        })
        .await
    }
}

fn ensure_exists(connection: &mut PgConnection, task_id: &TaskId) -> TaskRepositoryResult<()> {
    let exists = diesel::select(diesel::dsl::exists(
        analysis_tasks::table.filter(analysis_tasks::id.eq(task_id.as_str())),
    ))
    .get_result::<bool>(connection)
    .map_err(TaskRepositoryError::persistence)?;
    if exists {
        Ok(())
    } else {
        Err(TaskRepositoryError::NotFound(task_id.clone()))
    }
}

fn map_write_error(
    err: DieselError,
    task_id: &TaskId,
    application_id: &ApplicationId,
) -> TaskRepositoryError {
    match err {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, ref info)
            if is_active_application_violation(info.as_ref()) =>
        {
            TaskRepositoryError::ActiveTaskExists(application_id.clone())
        }
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            TaskRepositoryError::DuplicateTask(task_id.clone())
        }
        _ => TaskRepositoryError::persistence(err),
    }
}

fn is_active_application_violation(info: &dyn DatabaseErrorInformation) -> bool {
    info.constraint_name()
        .is_some_and(|name| name == ACTIVE_APPLICATION_INDEX)
}

fn to_i32(value: u32) -> TaskRepositoryResult<i32> {
    i32::try_from(value).map_err(TaskRepositoryError::persistence)
}

fn to_u32(value: i32) -> TaskRepositoryResult<u32> {
    u32::try_from(value).map_err(TaskRepositoryError::persistence)
}

fn to_row(task: &AnalysisTask) -> TaskRepositoryResult<AnalysisTaskRow> {
    let progress = task.progress();
    let timing = task.timing();
    let error = task
        .error()
        .map(serde_json::to_value)
        .transpose()
        .map_err(TaskRepositoryError::persistence)?;
    let results = task
        .results()
        .map(serde_json::to_value)
        .transpose()
        .map_err(TaskRepositoryError::persistence)?;

    Ok(AnalysisTaskRow {
        id: task.id().as_str().to_owned(),
        application_id: task.application_id().as_str().to_owned(),
        workspace_id: task.workspace_id().as_str().to_owned(),
        status: task.status().as_str().to_owned(),
        priority: task.priority().as_str().to_owned(),
        total_steps: to_i32(progress.total_steps())?,
        completed_steps: to_i32(progress.completed_steps())?,
        current_step: progress.current_step().map(|step| step.as_str().to_owned()),
        queued_at: timing.queued_at,
        started_at: timing.started_at,
        completed_at: timing.completed_at,
        duration_ms: timing.duration_ms,
        estimated_completion: timing.estimated_completion,
        error,
        retry_count: to_i32(task.retry_count())?,
        max_retries: to_i32(task.max_retries())?,
        worker_id: task.worker_id().map(|worker| worker.as_str().to_owned()),
        results,
        created_at: task.created_at(),
        updated_at: task.updated_at(),
    })
}

fn row_to_task(row: AnalysisTaskRow) -> TaskRepositoryResult<AnalysisTask> {
    let AnalysisTaskRow {
        id,
        application_id,
        workspace_id,
        status,
        priority,
        total_steps,
        completed_steps,
        current_step,
        queued_at,
        started_at,
        completed_at,
        duration_ms,
        estimated_completion,
        error,
        retry_count,
        max_retries,
        worker_id,
        results,
        created_at,
        updated_at,
    } = row;

    let current_step = current_step
        .as_deref()
        .map(PipelineStep::try_from)
        .transpose()
        .map_err(TaskRepositoryError::persistence)?;
    let data = PersistedAnalysisTaskData {
        id: TaskId::new(id).map_err(TaskRepositoryError::persistence)?,
        application_id: ApplicationId::new(application_id)
            .map_err(TaskRepositoryError::persistence)?,
        workspace_id: WorkspaceId::new(workspace_id).map_err(TaskRepositoryError::persistence)?,
        status: TaskStatus::try_from(status.as_str()).map_err(TaskRepositoryError::persistence)?,
        priority: TaskPriority::try_from(priority.as_str())
            .map_err(TaskRepositoryError::persistence)?,
        progress: TaskProgress::from_parts(
            to_u32(total_steps)?,
            to_u32(completed_steps)?,
            current_step,
        ),
        timing: TaskTiming {
            queued_at,
            started_at,
            completed_at,
            duration_ms,
            estimated_completion,
        },
        error: error
            .map(serde_json::from_value)
            .transpose()
            .map_err(TaskRepositoryError::persistence)?,
        retry_count: to_u32(retry_count)?,
        max_retries: to_u32(max_retries)?,
        worker_id: worker_id
            .map(WorkerId::new)
            .transpose()
            .map_err(TaskRepositoryError::persistence)?,
        results: results
            .map(serde_json::from_value)
            .transpose()
            .map_err(TaskRepositoryError::persistence)?,
        created_at,
        updated_at,
    };
    Ok(AnalysisTask::from_persisted(data))
}
