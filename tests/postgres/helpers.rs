//! Shared helpers for `PostgreSQL` task store tests.

use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, Pool};
use interview_analysis::analysis::{
    adapters::postgres::PostgresAnalysisTaskRepository,
    domain::{AnalysisDomainError, AnalysisTask, ApplicationId, TaskPriority, WorkspaceId},
};
use mockable::DefaultClock;
use pg_embedded_setup_unpriv::TestCluster;
use tokio::runtime::Runtime;

/// SQL creating the task table and its indexes.
const CREATE_TASKS_SQL: &str =
    include_str!("../../migrations/2026-10-01-000000_create_analysis_tasks/up.sql");

/// Template database name for the pre-migrated schema.
const TEMPLATE_DB: &str = "analysis_test_template";

/// Connections per test pool; enough for concurrent claims.
const POOL_SIZE: u32 = 8;

/// Builds a multi-threaded runtime so blocking pool calls overlap.
///
/// # Errors
///
/// Returns an error when the runtime cannot be created.
pub fn test_runtime() -> eyre::Result<Runtime> {
    Ok(tokio::runtime::Builder::new_multi_thread()
        .worker_threads(4)
        .enable_all()
        .build()?)
}

/// Ensures the template database exists with the schema applied.
///
/// # Errors
///
/// Returns an error when template creation or migration fails.
pub fn ensure_template(cluster: &TestCluster) -> eyre::Result<()> {
    cluster
        .ensure_template_exists(TEMPLATE_DB, |db_name| {
            let url = cluster.connection().database_url(db_name);
            let mut conn = PgConnection::establish(&url).map_err(|e| eyre::eyre!("{e}"))?;
            execute_sql_statements(&mut conn, CREATE_TASKS_SQL)?;
            Ok(())
        })
        .map_err(|err| eyre::eyre!("template setup failed: {err}"))
}

/// Executes each statement of a migration script in turn.
fn execute_sql_statements(conn: &mut PgConnection, sql: &str) -> eyre::Result<()> {
    for statement in sql.split(';') {
        let trimmed = statement.trim();
        if trimmed.is_empty() || trimmed.lines().all(|line| line.trim().starts_with("--")) {
            continue;
        }
        diesel::sql_query(trimmed)
            .execute(conn)
            .map_err(|e| eyre::eyre!("SQL error: {e}\nStatement: {trimmed}"))?;
    }
    Ok(())
}

/// Per-test database cloned from the template and dropped afterwards.
pub struct TestDatabase {
    cluster: &'static TestCluster,
    name: String,
}

impl TestDatabase {
    /// Creates a uniquely named database from the template.
    ///
    /// # Errors
    ///
    /// Returns an error when the template or the database cannot be created.
    pub fn create(cluster: &'static TestCluster, prefix: &str) -> eyre::Result<Self> {
        ensure_template(cluster)?;
        let name = format!("{prefix}_{}", uuid::Uuid::new_v4().simple());
        cluster
            .create_database_from_template(name.as_str(), TEMPLATE_DB)
            .map_err(|err| eyre::eyre!("could not create {name}: {err}"))?;
        Ok(Self { cluster, name })
    }

    /// Builds a task store over a fresh connection pool.
    ///
    /// # Errors
    ///
    /// Returns an error when the pool cannot connect.
    pub fn repository(&self) -> eyre::Result<PostgresAnalysisTaskRepository> {
        let url = self.cluster.connection().database_url(&self.name);
        let pool = Pool::builder()
            .max_size(POOL_SIZE)
            .build(ConnectionManager::<PgConnection>::new(url))?;
        Ok(PostgresAnalysisTaskRepository::new(pool))
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        if let Err(err) = self.cluster.drop_database(self.name.as_str()) {
            tracing::warn!(database = %self.name, error = %err, "could not drop test database");
        }
    }
}

/// Builds a `pending` task for `application`.
///
/// # Errors
///
/// Returns an error for an invalid application id.
pub fn pending_task(application: &str) -> Result<AnalysisTask, AnalysisDomainError> {
    Ok(AnalysisTask::new(
        ApplicationId::new(application)?,
        WorkspaceId::new("ws-1")?,
        TaskPriority::Normal,
        3,
        &DefaultClock,
    ))
}
