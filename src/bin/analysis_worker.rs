//! Runs the background interview analysis worker pool.
//!
//! Usage:
//!
//! ```text
//! analysis-worker --database-url postgres://localhost/interviews \
//!     --ollama-url http://localhost:11434 --max-workers 3
//! ```
//!
//! Every flag can also be supplied through the environment variable named
//! in `--help`. The database schema is expected to be migrated already.
//! The process recovers stored tasks on start-up, then runs until it
//! receives Ctrl-C, draining busy workers before it exits.

use clap::Parser;
use diesel::pg::PgConnection;
use diesel::r2d2::{ConnectionManager, Pool};
use interview_analysis::analysis::{
    adapters::{
        ollama::{OllamaAnalysisBackend, OllamaConfig},
        postgres::{PostgresAnalysisTaskRepository, PostgresInterviewRepository},
    },
    services::{AnalysisEvent, AnalysisWorkerManager, WorkerManagerConfig},
};
use interview_analysis::telemetry;
use mockable::DefaultClock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{info, warn};

/// Boxed error type for the main result.
type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Command-line and environment configuration.
#[derive(Debug, Parser)]
#[command(name = "analysis-worker", about = "Background AI analysis of interviews")]
struct Cli {
    /// `PostgreSQL` connection URL.
    #[arg(long, env = "DATABASE_URL")]
    database_url: String,

    /// Maximum pooled database connections.
    #[arg(long, env = "DATABASE_POOL_SIZE", default_value_t = 10)]
    database_pool_size: u32,

    /// Ollama server base URL.
    #[arg(long, env = "OLLAMA_URL", default_value = "http://localhost:11434")]
    ollama_url: String,

    /// Model used for analysis.
    #[arg(long, env = "OLLAMA_MODEL", default_value = "llama3.1")]
    ollama_model: String,

    /// HTTP timeout for a single Ollama request, in seconds.
    #[arg(long, env = "OLLAMA_TIMEOUT_SECS", default_value_t = 60)]
    ollama_timeout_secs: u64,

    /// Attempts per Ollama call before giving up.
    #[arg(long, env = "OLLAMA_MAX_ATTEMPTS", default_value_t = 3)]
    ollama_max_attempts: u32,

    /// Concurrent analysis workers.
    #[arg(long, env = "ANALYSIS_MAX_WORKERS", default_value_t = 3)]
    max_workers: usize,

    /// Attempt budget for new tasks.
    #[arg(long, env = "ANALYSIS_MAX_RETRIES", default_value_t = 3)]
    max_retries: u32,

    /// Delay before the first automatic retry, in seconds.
    #[arg(long, env = "ANALYSIS_RETRY_BASE_SECS", default_value_t = 5)]
    retry_base_secs: u64,

    /// Upper bound on retry delays, in seconds.
    #[arg(long, env = "ANALYSIS_MAX_RETRY_DELAY_SECS", default_value_t = 300)]
    max_retry_delay_secs: u64,

    /// Bound on each AI call made by the pipeline, in seconds.
    #[arg(long, env = "ANALYSIS_STEP_TIMEOUT_SECS", default_value_t = 120)]
    step_timeout_secs: u64,

    /// Percentage of failed response analyses above which a task fails.
    #[arg(long, env = "ANALYSIS_FAILURE_THRESHOLD", default_value_t = 50)]
    failure_threshold_percent: u8,

    /// Disable automatic retries of failed tasks.
    #[arg(long, env = "ANALYSIS_NO_AUTO_RETRY")]
    no_auto_retry: bool,

    /// Interval for picking up tasks queued by other processes, in seconds.
    #[arg(long, env = "ANALYSIS_RESCAN_SECS")]
    rescan_secs: Option<u64>,

    /// How long shutdown waits for busy workers, in seconds.
    #[arg(long, env = "ANALYSIS_SHUTDOWN_TIMEOUT_SECS", default_value_t = 30)]
    shutdown_timeout_secs: u64,

    /// Emit logs as JSON lines.
    #[arg(long, env = "LOG_JSON")]
    log_json: bool,
}

impl Cli {
    fn manager_config(&self) -> WorkerManagerConfig {
        WorkerManagerConfig::default()
            .with_max_workers(self.max_workers)
            .with_default_max_retries(self.max_retries)
            .with_retry_base_delay(Duration::from_secs(self.retry_base_secs))
            .with_max_retry_delay(Duration::from_secs(self.max_retry_delay_secs))
            .with_step_timeout(Duration::from_secs(self.step_timeout_secs))
            .with_failure_threshold_percent(self.failure_threshold_percent)
            .with_auto_retry(!self.no_auto_retry)
            .with_pending_rescan_interval(self.rescan_secs.map(Duration::from_secs))
            .with_shutdown_timeout(Duration::from_secs(self.shutdown_timeout_secs))
    }

    fn ollama_config(&self) -> OllamaConfig {
        OllamaConfig::default()
            .with_base_url(self.ollama_url.clone())
            .with_model(self.ollama_model.clone())
            .with_request_timeout(Duration::from_secs(self.ollama_timeout_secs))
            .with_max_attempts(self.ollama_max_attempts)
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let cli = Cli::parse();
    telemetry::init_tracing(telemetry::DEFAULT_LOG_FILTER, cli.log_json)?;

    let database_url = cli.database_url.clone();
    let pool_size = cli.database_pool_size;
    let pool = tokio::task::spawn_blocking(move || {
        Pool::builder()
            .max_size(pool_size)
            .build(ConnectionManager::<PgConnection>::new(database_url))
    })
    .await??;

    let manager = AnalysisWorkerManager::new(
        Arc::new(PostgresAnalysisTaskRepository::new(pool.clone())),
        Arc::new(PostgresInterviewRepository::new(pool)),
        Arc::new(OllamaAnalysisBackend::new(cli.ollama_config())?),
        Arc::new(DefaultClock),
        cli.manager_config(),
    )?;

    let event_log = tokio::spawn(log_events(manager.subscribe()));
    manager.start().await?;
    info!(model = %cli.ollama_model, "waiting for analysis tasks");

    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");
    manager.shutdown().await;
    event_log.abort();
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<AnalysisEvent>) {
    loop {
        match events.recv().await {
            Ok(AnalysisEvent::Progress {
                task_id,
                step,
                current,
                total,
                ..
            }) => info!(%task_id, %step, ?current, ?total, "analysis progress"),
            Ok(AnalysisEvent::Completed { task_id, results }) => info!(
                %task_id,
                overall_score = results.overall_score,
                responses = results.individual_scores.len(),
                "analysis completed"
            ),
            Ok(AnalysisEvent::Failed {
                task_id,
                error,
                retry,
            }) => warn!(%task_id, %error, retry, "analysis failed"),
            Ok(AnalysisEvent::Error { task_id, message }) => {
                warn!(%task_id, %message, "analysis error");
            }
            Ok(AnalysisEvent::Cancelled { task_id }) => info!(%task_id, "analysis cancelled"),
            Err(RecvError::Lagged(skipped)) => warn!(skipped, "event log fell behind"),
            Err(RecvError::Closed) => break,
        }
    }
}
