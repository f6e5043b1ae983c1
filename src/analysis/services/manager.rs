//! Analysis worker manager: admission, dispatch, retry and cancellation.
//!
//! The manager owns a fixed pool of worker slots and a priority-ordered
//! ready queue. Only the scheduler loop pops the queue; workers claim their
//! task atomically through the task store and hand their outcome back for
//! the retry decision.

use super::{
    AnalysisEvent, AnalysisPipeline, EventPublisher, PipelineOutcome, ReadyQueue,
    WorkerManagerConfig,
};
use crate::analysis::{
    domain::{
        AnalysisDomainError, AnalysisTask, ApplicationId, TaskError, TaskErrorCode, TaskId,
        TaskPriority, TaskStatus, WorkerId, WorkspaceId,
    },
    ports::{AnalysisBackend, AnalysisTaskRepository, InterviewRepository, TaskRepositoryError},
};
use mockable::Clock;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{Notify, broadcast};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Attempts made by [`AnalysisWorkerManager::cancel_task`] when the task
/// changes status underneath it.
const CANCEL_ATTEMPTS: usize = 3;

/// Request payload for queueing an analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueAnalysisRequest {
    application_id: String,
    workspace_id: String,
    priority: TaskPriority,
    max_retries: Option<u32>,
}

impl QueueAnalysisRequest {
    /// Creates a normal-priority request.
    #[must_use]
    pub fn new(application_id: impl Into<String>, workspace_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            workspace_id: workspace_id.into(),
            priority: TaskPriority::Normal,
            max_retries: None,
        }
    }

    /// Sets the dequeue priority.
    #[must_use]
    pub const fn with_priority(mut self, priority: TaskPriority) -> Self {
        self.priority = priority;
        self
    }

    /// Overrides the configured attempt budget.
    #[must_use]
    pub const fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }
}

/// Whether a submission created a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueDisposition {
    /// A new task was stored and queued.
    Created,
    /// The application already had an in-flight task; its id is returned.
    AlreadyQueued,
}

/// Result of a submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTask {
    /// Task handling the application.
    pub task_id: TaskId,
    /// 1-based position in the ready queue, if the task is waiting there.
    pub position: Option<usize>,
    /// Whether the task was created by this call.
    pub disposition: QueueDisposition,
}

/// Result of a cancellation request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The task is now `cancelled` in the store.
    Cancelled,
    /// The owning worker was signalled and will stop at its next
    /// checkpoint.
    ///
    /// An attempt that fails before that checkpoint still ends
    /// `cancelled` and is not retried. A signal that arrives while results
    /// are being saved is too late: the task ends `completed` and only the
    /// [`AnalysisEvent::Completed`] event is published.
    Requested,
}

/// A retry accepted by [`AnalysisWorkerManager::retry_task`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledRetry {
    /// Retried task.
    pub task_id: TaskId,
    /// Failed attempts so far.
    pub retry_count: u32,
    /// Delay before the task re-enters the ready queue.
    pub delay: Duration,
}

/// Snapshot of queue and pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueStats {
    /// Tasks stored as `pending`.
    pub pending_count: u64,
    /// Tasks stored as `processing`.
    pub processing_count: u64,
    /// Workers of this manager currently running a task.
    pub active_workers: usize,
    /// Pool size.
    pub max_workers: usize,
}

/// Service-level errors for the worker manager.
#[derive(Debug, Error)]
pub enum WorkerManagerError {
    /// Configuration rejected by [`WorkerManagerConfig::validate`].
    #[error("invalid worker manager configuration: {0}")]
    InvalidConfig(String),

    /// The task does not exist.
    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    /// The task is not `pending` or `processing`.
    #[error("task {task_id} cannot be cancelled from status {status}")]
    NotCancellable {
        /// Task identifier.
        task_id: TaskId,
        /// Current status.
        status: TaskStatus,
    },

    /// The task is not `failed`.
    #[error("task {task_id} cannot be retried from status {status}")]
    NotRetryable {
        /// Task identifier.
        task_id: TaskId,
        /// Current status.
        status: TaskStatus,
    },

    /// Another task for the application is in flight.
    #[error("application {application_id} already has active task {active_task_id}")]
    ApplicationBusy {
        /// Application identifier.
        application_id: ApplicationId,
        /// The in-flight task.
        active_task_id: TaskId,
    },

    /// [`AnalysisWorkerManager::start`] was called twice.
    #[error("worker manager is already running")]
    AlreadyStarted,

    /// The manager has been shut down.
    #[error("worker manager has been shut down")]
    ShutDown,

    /// Domain validation failed.
    #[error(transparent)]
    Domain(#[from] AnalysisDomainError),

    /// Repository operation failed.
    #[error(transparent)]
    Repository(#[from] TaskRepositoryError),
}

/// Result type for worker manager operations.
pub type WorkerManagerResult<T> = Result<T, WorkerManagerError>;

#[derive(Debug)]
struct SchedulerState {
    ready: ReadyQueue,
    running: HashMap<TaskId, CancellationToken>,
    delayed: HashMap<TaskId, CancellationToken>,
    idle_slots: Vec<usize>,
    started: bool,
}

impl SchedulerState {
    fn new(max_workers: usize) -> Self {
        Self {
            ready: ReadyQueue::new(),
            running: HashMap::new(),
            delayed: HashMap::new(),
            idle_slots: (1..=max_workers).rev().collect(),
            started: false,
        }
    }

    fn cancel_requested(&self, task_id: &TaskId) -> bool {
        self.running
            .get(task_id)
            .is_some_and(CancellationToken::is_cancelled)
    }

    fn is_tracked(&self, task_id: &TaskId) -> bool {
        self.ready.contains(task_id)
            || self.running.contains_key(task_id)
            || self.delayed.contains_key(task_id)
    }
}

struct ManagerInner<R, I, B, C>
where
    R: AnalysisTaskRepository,
    I: InterviewRepository,
    B: AnalysisBackend,
    C: Clock + Send + Sync,
{
    tasks: Arc<R>,
    clock: Arc<C>,
    config: WorkerManagerConfig,
    events: EventPublisher,
    pipeline: AnalysisPipeline<R, I, B, C>,
    state: Mutex<SchedulerState>,
    workers: Mutex<JoinSet<()>>,
    retry_timers: Mutex<JoinSet<()>>,
    scheduler: Mutex<Option<JoinHandle<()>>>,
    wake: Notify,
    shutdown: CancellationToken,
}

/// Scheduler owning a fixed pool of analysis workers.
///
/// Cloning yields another handle to the same manager.
pub struct AnalysisWorkerManager<R, I, B, C>
where
    R: AnalysisTaskRepository,
    I: InterviewRepository,
    B: AnalysisBackend,
    C: Clock + Send + Sync,
{
    inner: Arc<ManagerInner<R, I, B, C>>,
}

impl<R, I, B, C> Clone for AnalysisWorkerManager<R, I, B, C>
where
    R: AnalysisTaskRepository,
    I: InterviewRepository,
    B: AnalysisBackend,
    C: Clock + Send + Sync,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<R, I, B, C> AnalysisWorkerManager<R, I, B, C>
where
    R: AnalysisTaskRepository + 'static,
    I: InterviewRepository + 'static,
    B: AnalysisBackend + 'static,
    C: Clock + Send + Sync + 'static,
{
    /// Creates a stopped manager.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerManagerError::InvalidConfig`] when `config` fails
    /// validation.
    pub fn new(
        tasks: Arc<R>,
        interviews: Arc<I>,
        backend: Arc<B>,
        clock: Arc<C>,
        config: WorkerManagerConfig,
    ) -> WorkerManagerResult<Self> {
        config.validate()?;
        let events = EventPublisher::new(config.event_capacity());
        let pipeline = AnalysisPipeline::new(
            Arc::clone(&tasks),
            interviews,
            backend,
            Arc::clone(&clock),
            events.clone(),
            config.clone(),
        );
        let state = SchedulerState::new(config.max_workers());
        Ok(Self {
            inner: Arc::new(ManagerInner {
                tasks,
                clock,
                config,
                events,
                pipeline,
                state: Mutex::new(state),
                workers: Mutex::new(JoinSet::new()),
                retry_timers: Mutex::new(JoinSet::new()),
                scheduler: Mutex::new(None),
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
            }),
        })
    }

    /// Registers an event subscriber.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AnalysisEvent> {
        self.inner.events.subscribe()
    }

    /// Returns the active configuration.
    #[must_use]
    pub fn config(&self) -> &WorkerManagerConfig {
        &self.inner.config
    }

    /// Recovers stored work and starts the scheduler.
    ///
    /// Stored `pending` tasks are queued. Stored `processing` tasks not
    /// owned by this manager are failed with
    /// [`TaskErrorCode::WorkerLost`] and go through the retry decision.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerManagerError::AlreadyStarted`] on a second call,
    /// [`WorkerManagerError::ShutDown`] after shutdown, or repository
    /// errors raised during recovery.
    pub async fn start(&self) -> WorkerManagerResult<()> {
        if self.inner.shutdown.is_cancelled() {
            return Err(WorkerManagerError::ShutDown);
        }
        {
            let mut state = self.lock_state();
            if state.started {
                return Err(WorkerManagerError::AlreadyStarted);
            }
            state.started = true;
        }

        if let Err(err) = self.recover().await {
            self.lock_state().started = false;
            return Err(err);
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move { manager.run_scheduler().await });
        *self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(handle);
        info!(
            max_workers = self.inner.config.max_workers(),
            "analysis worker manager started"
        );
        Ok(())
    }

    /// Stops dispatching and waits for busy workers.
    ///
    /// Workers still running after the shutdown timeout are aborted; their
    /// tasks stay `processing` until the next start recovers them.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        let scheduler = self
            .inner
            .scheduler
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = scheduler
            && let Err(err) = handle.await
        {
            warn!(error = %err, "scheduler loop ended abnormally");
        }
        let mut timers = std::mem::take(
            &mut *self
                .inner
                .retry_timers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        timers.abort_all();
        while timers.join_next().await.is_some() {}

        let mut workers = std::mem::take(
            &mut *self
                .inner
                .workers
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        let busy = workers.len();
        let drained = tokio::time::timeout(self.inner.config.shutdown_timeout(), async {
            while workers.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                remaining = workers.len(),
                "shutdown timeout elapsed, aborting busy workers"
            );
            workers.abort_all();
            while workers.join_next().await.is_some() {}
        }
        info!(drained = busy, "analysis worker manager stopped");
    }

    /// Queues an analysis for an application.
    ///
    /// Submitting an application that already has a `pending` or
    /// `processing` task returns that task with
    /// [`QueueDisposition::AlreadyQueued`].
    ///
    /// # Errors
    ///
    /// Returns [`WorkerManagerError::Domain`] for invalid identifiers or
    /// [`WorkerManagerError::Repository`] when persistence fails.
    pub async fn queue_analysis_task(
        &self,
        request: QueueAnalysisRequest,
    ) -> WorkerManagerResult<QueuedTask> {
        let application_id = ApplicationId::new(request.application_id)?;
        let workspace_id = WorkspaceId::new(request.workspace_id)?;

        if let Some(existing) = self
            .inner
            .tasks
            .find_active_for_application(&application_id)
            .await?
        {
            return Ok(self.already_queued(&existing));
        }

        let max_retries = request
            .max_retries
            .unwrap_or(self.inner.config.default_max_retries());
        let task = AnalysisTask::new(
            application_id,
            workspace_id,
            request.priority,
            max_retries,
            self.inner.clock.as_ref(),
        );
        match self.inner.tasks.store(&task).await {
            Ok(()) => {}
            Err(TaskRepositoryError::ActiveTaskExists(application_id)) => {
                let existing = self
                    .inner
                    .tasks
                    .find_active_for_application(&application_id)
                    .await?
                    .ok_or(TaskRepositoryError::ActiveTaskExists(application_id))?;
                return Ok(self.already_queued(&existing));
            }
            Err(err) => return Err(err.into()),
        }

        let position = self.lock_state().ready.push(
            task.id().clone(),
            task.priority(),
            task.timing().queued_at,
        );
        self.inner.wake.notify_one();
        info!(
            task_id = %task.id(),
            application_id = %task.application_id(),
            priority = %task.priority(),
            position,
            "analysis task queued"
        );
        Ok(QueuedTask {
            task_id: task.id().clone(),
            position: Some(position),
            disposition: QueueDisposition::Created,
        })
    }

    /// Cancels a `pending` or `processing` task.
    ///
    /// A `pending` task is removed from the queue and cancelled at once. A
    /// `processing` task owned by this manager is signalled and lands in
    /// `cancelled` at its next checkpoint.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerManagerError::TaskNotFound`],
    /// [`WorkerManagerError::NotCancellable`] for terminal tasks, or
    /// repository errors.
    pub async fn cancel_task(&self, task_id: &TaskId) -> WorkerManagerResult<CancelOutcome> {
        for _ in 0..CANCEL_ATTEMPTS {
            let mut task = self.load(task_id).await?;
            let status = task.status();
            match status {
                TaskStatus::Pending => {
                    {
                        let mut state = self.lock_state();
                        state.ready.remove(task_id);
                        if let Some(timer) = state.delayed.remove(task_id) {
                            timer.cancel();
                        }
                    }
                    task.cancel(self.inner.clock.as_ref())?;
                }
                TaskStatus::Processing => {
                    let token = self.lock_state().running.get(task_id).cloned();
                    if let Some(running) = token {
                        running.cancel();
                        info!(%task_id, "cancellation requested for running task");
                        return Ok(CancelOutcome::Requested);
                    }
                    task.cancel(self.inner.clock.as_ref())?;
                }
                TaskStatus::Completed | TaskStatus::Failed | TaskStatus::Cancelled => {
                    return Err(WorkerManagerError::NotCancellable {
                        task_id: task_id.clone(),
                        status,
                    });
                }
            }
            if self.inner.tasks.update_if_status(&task, status).await? {
                info!(%task_id, from = %status, "task cancelled");
                self.inner.events.publish(AnalysisEvent::Cancelled {
                    task_id: task_id.clone(),
                });
                return Ok(CancelOutcome::Cancelled);
            }
            debug!(%task_id, "task changed during cancellation, re-reading");
        }
        let status = self.load(task_id).await?.status();
        Err(WorkerManagerError::NotCancellable {
            task_id: task_id.clone(),
            status,
        })
    }

    /// Re-queues a `failed` task after the backoff delay.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerManagerError::NotRetryable`] unless the task is
    /// `failed`, [`WorkerManagerError::Domain`] once the attempt budget is
    /// spent, or [`WorkerManagerError::ApplicationBusy`] when another task
    /// for the application is in flight.
    pub async fn retry_task(&self, task_id: &TaskId) -> WorkerManagerResult<ScheduledRetry> {
        let task = self.load(task_id).await?;
        if task.status() != TaskStatus::Failed {
            return Err(WorkerManagerError::NotRetryable {
                task_id: task_id.clone(),
                status: task.status(),
            });
        }
        if let Some(active) = self
            .inner
            .tasks
            .find_active_for_application(task.application_id())
            .await?
        {
            return Err(WorkerManagerError::ApplicationBusy {
                application_id: task.application_id().clone(),
                active_task_id: active.id().clone(),
            });
        }
        match self.schedule_retry(task).await? {
            Some(retry) => Ok(retry),
            None => {
                let status = self.load(task_id).await?.status();
                Err(WorkerManagerError::NotRetryable {
                    task_id: task_id.clone(),
                    status,
                })
            }
        }
    }

    /// Returns store counts and pool occupancy.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerManagerError::Repository`] when counting fails.
    pub async fn get_queue_stats(&self) -> WorkerManagerResult<QueueStats> {
        let pending_count = self.inner.tasks.count_by_status(TaskStatus::Pending).await?;
        let processing_count = self
            .inner
            .tasks
            .count_by_status(TaskStatus::Processing)
            .await?;
        Ok(QueueStats {
            pending_count,
            processing_count,
            active_workers: self.lock_state().running.len(),
            max_workers: self.inner.config.max_workers(),
        })
    }

    /// Looks up a task.
    ///
    /// # Errors
    ///
    /// Returns [`WorkerManagerError::Repository`] when the lookup fails.
    pub async fn get_task(&self, task_id: &TaskId) -> WorkerManagerResult<Option<AnalysisTask>> {
        Ok(self.inner.tasks.find_by_id(task_id).await?)
    }

    fn lock_state(&self) -> MutexGuard<'_, SchedulerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn load(&self, task_id: &TaskId) -> WorkerManagerResult<AnalysisTask> {
        self.inner
            .tasks
            .find_by_id(task_id)
            .await?
            .ok_or_else(|| WorkerManagerError::TaskNotFound(task_id.clone()))
    }

    fn already_queued(&self, existing: &AnalysisTask) -> QueuedTask {
        let position = self.lock_state().ready.position(existing.id());
        info!(
            task_id = %existing.id(),
            application_id = %existing.application_id(),
            status = %existing.status(),
            "application already has an active analysis task"
        );
        QueuedTask {
            task_id: existing.id().clone(),
            position,
            disposition: QueueDisposition::AlreadyQueued,
        }
    }

    async fn recover(&self) -> WorkerManagerResult<()> {
        let queued = self.enqueue_stored_pending().await?;
        let orphaned = self
            .inner
            .tasks
            .list_by_status(TaskStatus::Processing)
            .await?;
        let mut failed = 0_usize;
        for task in orphaned {
            if self.lock_state().running.contains_key(task.id()) {
                continue;
            }
            let error = TaskError::new(
                TaskErrorCode::WorkerLost,
                "worker stopped before the analysis finished",
                task.progress().current_step(),
            );
            warn!(task_id = %task.id(), "failing orphaned processing task");
            self.record_failure(task, error).await?;
            failed += 1;
        }
        info!(queued, orphaned = failed, "recovered stored analysis tasks");
        Ok(())
    }

    /// Queues stored `pending` tasks this manager is not tracking yet.
    async fn enqueue_stored_pending(&self) -> WorkerManagerResult<usize> {
        let pending = self.inner.tasks.list_by_status(TaskStatus::Pending).await?;
        let mut added = 0_usize;
        {
            let mut state = self.lock_state();
            for task in pending {
                if state.is_tracked(task.id()) {
                    continue;
                }
                state
                    .ready
                    .push(task.id().clone(), task.priority(), task.timing().queued_at);
                added += 1;
            }
        }
        if added > 0 {
            self.inner.wake.notify_one();
        }
        Ok(added)
    }

    async fn run_scheduler(&self) {
        let mut rescan = self
            .inner
            .config
            .pending_rescan_interval()
            .map(tokio::time::interval);
        loop {
            self.dispatch_ready();
            tokio::select! {
                () = self.inner.shutdown.cancelled() => break,
                () = self.inner.wake.notified() => {}
                () = next_tick(rescan.as_mut()) => {
                    match self.enqueue_stored_pending().await {
                        Ok(0) => {}
                        Ok(added) => debug!(added, "rescan picked up pending tasks"),
                        Err(err) => warn!(error = %err, "pending rescan failed"),
                    }
                }
            }
        }
        debug!("scheduler loop stopped");
    }

    fn dispatch_ready(&self) {
        if self.inner.shutdown.is_cancelled() {
            return;
        }
        let mut state = self.lock_state();
        let mut workers = self
            .inner
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while workers.try_join_next().is_some() {}
        let mut timers = self
            .inner
            .retry_timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while timers.try_join_next().is_some() {}
        drop(timers);

        while !state.idle_slots.is_empty() {
            let Some(task_id) = state.ready.pop() else {
                break;
            };
            let Some(slot) = state.idle_slots.pop() else {
                break;
            };
            let cancel = CancellationToken::new();
            state.running.insert(task_id.clone(), cancel.clone());
            let manager = self.clone();
            workers.spawn(async move { manager.run_worker(slot, &task_id, &cancel).await });
        }
    }

    async fn run_worker(&self, slot: usize, task_id: &TaskId, cancel: &CancellationToken) {
        let worker_id = WorkerId::for_slot(slot);
        if let Err(err) = self.process(&worker_id, task_id, cancel).await {
            error!(%task_id, %worker_id, error = %err, "could not record task outcome");
            self.inner.events.publish(AnalysisEvent::Error {
                task_id: task_id.clone(),
                message: err.to_string(),
            });
        }
        {
            let mut state = self.lock_state();
            state.running.remove(task_id);
            state.idle_slots.push(slot);
        }
        self.inner.wake.notify_one();
    }

    async fn process(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
        cancel: &CancellationToken,
    ) -> WorkerManagerResult<()> {
        let Some(task) = self.claim(worker_id, task_id).await? else {
            return Ok(());
        };
        match self.inner.pipeline.run(task, cancel).await {
            PipelineOutcome::Completed(task) => {
                info!(
                    task_id = %task.id(),
                    %worker_id,
                    duration_ms = task.timing().duration_ms,
                    "analysis task completed"
                );
                if let Some(results) = task.results() {
                    self.inner.events.publish(AnalysisEvent::Completed {
                        task_id: task.id().clone(),
                        results: results.clone(),
                    });
                }
                Ok(())
            }
            PipelineOutcome::Cancelled(task) => self.finish_cancelled(worker_id, task).await,
            PipelineOutcome::Superseded(task) => {
                info!(
                    task_id = %task.id(),
                    %worker_id,
                    "task changed by another writer, result discarded"
                );
                Ok(())
            }
            PipelineOutcome::Failed { task, error } => {
                if self.release_unless_cancelled(task.id()) {
                    info!(
                        task_id = %task.id(),
                        %worker_id,
                        code = %error.code,
                        "attempt failed after cancellation was requested"
                    );
                    self.finish_cancelled(worker_id, task).await
                } else {
                    self.record_failure(task, error).await
                }
            }
        }
    }

    /// Returns `true` when cancellation of the running task was requested.
    ///
    /// Otherwise the task's token is dropped under the same lock, so a
    /// cancel arriving from now on goes through the store and races the
    /// failure write by compare-and-set instead of being lost.
    fn release_unless_cancelled(&self, task_id: &TaskId) -> bool {
        let mut state = self.lock_state();
        if state.cancel_requested(task_id) {
            return true;
        }
        state.running.remove(task_id);
        false
    }

    async fn finish_cancelled(
        &self,
        worker_id: &WorkerId,
        mut task: AnalysisTask,
    ) -> WorkerManagerResult<()> {
        task.cancel(self.inner.clock.as_ref())?;
        if self
            .inner
            .tasks
            .update_if_status(&task, TaskStatus::Processing)
            .await?
        {
            info!(task_id = %task.id(), %worker_id, "analysis task cancelled at checkpoint");
            self.inner.events.publish(AnalysisEvent::Cancelled {
                task_id: task.id().clone(),
            });
        }
        Ok(())
    }

    /// Claims a queued task; `None` when another worker got there first or
    /// the task is no longer `pending`.
    async fn claim(
        &self,
        worker_id: &WorkerId,
        task_id: &TaskId,
    ) -> WorkerManagerResult<Option<AnalysisTask>> {
        let Some(mut task) = self.inner.tasks.find_by_id(task_id).await? else {
            warn!(%task_id, "queued task disappeared from the store");
            return Ok(None);
        };
        if task.status() != TaskStatus::Pending {
            debug!(%task_id, status = %task.status(), "skipping task that is no longer pending");
            return Ok(None);
        }
        task.claim(worker_id.clone(), self.inner.clock.as_ref())?;
        if !self.inner.tasks.claim(&task).await? {
            info!(%task_id, %worker_id, "claim lost to another worker");
            return Ok(None);
        }
        info!(
            %task_id,
            application_id = %task.application_id(),
            %worker_id,
            "analysis task claimed"
        );
        Ok(Some(task))
    }

    /// Fails a `processing` task and applies the automatic retry decision.
    async fn record_failure(
        &self,
        mut task: AnalysisTask,
        error: TaskError,
    ) -> WorkerManagerResult<()> {
        task.fail(error.clone(), self.inner.clock.as_ref())?;
        if !self
            .inner
            .tasks
            .update_if_status(&task, TaskStatus::Processing)
            .await?
        {
            info!(task_id = %task.id(), "task changed before its failure was recorded");
            return Ok(());
        }
        warn!(
            task_id = %task.id(),
            code = %error.code,
            step = ?error.step,
            retry_count = task.retry_count(),
            max_retries = task.max_retries(),
            error = %error.message,
            "analysis attempt failed"
        );

        let task_id = task.id().clone();
        let retry = if self.inner.config.auto_retry() && task.can_retry() {
            match self.schedule_retry(task).await {
                Ok(scheduled) => scheduled.is_some(),
                Err(WorkerManagerError::Repository(TaskRepositoryError::ActiveTaskExists(
                    application_id,
                ))) => {
                    info!(%task_id, %application_id, "newer task in flight, automatic retry skipped");
                    false
                }
                Err(err) => return Err(err),
            }
        } else {
            false
        };
        self.inner.events.publish(AnalysisEvent::Failed {
            task_id,
            error,
            retry,
        });
        Ok(())
    }

    /// Moves a failed task back to `pending` and queues it after the
    /// backoff delay. `None` when the task changed concurrently.
    async fn schedule_retry(
        &self,
        mut task: AnalysisTask,
    ) -> WorkerManagerResult<Option<ScheduledRetry>> {
        if self.lock_state().cancel_requested(task.id()) {
            info!(task_id = %task.id(), "cancellation requested, retry refused");
            return Ok(None);
        }
        let delay = self.inner.config.retry_delay(task.retry_count());
        task.retry(self.inner.clock.as_ref())?;
        if !self
            .inner
            .tasks
            .update_if_status(&task, TaskStatus::Failed)
            .await?
        {
            return Ok(None);
        }
        info!(
            task_id = %task.id(),
            retry_count = task.retry_count(),
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "analysis retry scheduled"
        );
        self.enqueue_after(&task, delay);
        Ok(Some(ScheduledRetry {
            task_id: task.id().clone(),
            retry_count: task.retry_count(),
            delay,
        }))
    }

    fn enqueue_after(&self, task: &AnalysisTask, delay: Duration) {
        let task_id = task.id().clone();
        let priority = task.priority();
        let queued_at = task.timing().queued_at;
        let timer = CancellationToken::new();
        let mut state = self.lock_state();
        if state.cancel_requested(&task_id) {
            debug!(%task_id, "cancellation requested, delayed enqueue skipped");
            return;
        }
        state.delayed.insert(task_id.clone(), timer.clone());
        let manager = self.clone();
        self.inner
            .retry_timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .spawn(async move {
                tokio::select! {
                    () = tokio::time::sleep(delay) => {}
                    () = timer.cancelled() => return,
                    () = manager.inner.shutdown.cancelled() => return,
                }
                {
                    let mut current = manager.lock_state();
                    if current.delayed.remove(&task_id).is_some() {
                        current.ready.push(task_id, priority, queued_at);
                    }
                }
                manager.inner.wake.notify_one();
            });
    }
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}
