//! In-memory task store for tests and single-process deployments.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::analysis::{
    domain::{AnalysisTask, ApplicationId, TaskId, TaskStatus},
    ports::{AnalysisTaskRepository, TaskRepositoryError, TaskRepositoryResult},
};

/// Thread-safe in-memory task repository.
///
/// Every mutation happens under one write lock, which makes claims and
/// conditional updates atomic.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAnalysisTaskRepository {
    state: Arc<RwLock<InMemoryTaskState>>,
}

#[derive(Debug, Default)]
struct InMemoryTaskState {
    tasks: HashMap<TaskId, AnalysisTask>,
    active_index: HashMap<ApplicationId, TaskId>,
}

impl InMemoryTaskState {
    /// Rejects `task` when another task of the same application is active.
    fn ensure_no_other_active(&self, task: &AnalysisTask) -> TaskRepositoryResult<()> {
        if !task.status().is_active() {
            return Ok(());
        }
        match self.active_index.get(task.application_id()) {
            Some(active_id) if active_id != task.id() => Err(
                TaskRepositoryError::ActiveTaskExists(task.application_id().clone()),
            ),
            _ => Ok(()),
        }
    }

    fn write_task(&mut self, task: &AnalysisTask) {
        let application_id = task.application_id().clone();
        if task.status().is_active() {
            self.active_index.insert(application_id, task.id().clone());
        } else if self
            .active_index
            .get(&application_id)
            .is_some_and(|active_id| active_id == task.id())
        {
            self.active_index.remove(&application_id);
        }
        self.tasks.insert(task.id().clone(), task.clone());
    }

    fn stored_status(&self, id: &TaskId) -> TaskRepositoryResult<TaskStatus> {
        self.tasks
            .get(id)
            .map(AnalysisTask::status)
            .ok_or_else(|| TaskRepositoryError::NotFound(id.clone()))
    }
}

impl InMemoryAnalysisTaskRepository {
    /// Creates an empty in-memory repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> TaskRepositoryResult<RwLockReadGuard<'_, InMemoryTaskState>> {
        self.state.read().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    fn write(&self) -> TaskRepositoryResult<RwLockWriteGuard<'_, InMemoryTaskState>> {
        self.state.write().map_err(|err| {
            TaskRepositoryError::persistence(std::io::Error::other(err.to_string()))
        })
    }

    /// Returns every stored task for the application, oldest first.
    ///
    /// # Errors
    ///
    /// Returns a persistence error when the lock is poisoned.
    pub fn tasks_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> TaskRepositoryResult<Vec<AnalysisTask>> {
        let state = self.read()?;
        let mut tasks: Vec<AnalysisTask> = state
            .tasks
            .values()
            .filter(|task| task.application_id() == application_id)
            .cloned()
            .collect();
        tasks.sort_by_key(AnalysisTask::created_at);
        Ok(tasks)
    }
}

#[async_trait]
impl AnalysisTaskRepository for InMemoryAnalysisTaskRepository {
    async fn store(&self, task: &AnalysisTask) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        if state.tasks.contains_key(task.id()) {
            return Err(TaskRepositoryError::DuplicateTask(task.id().clone()));
        }
        state.ensure_no_other_active(task)?;
        state.write_task(task);
        Ok(())
    }

    async fn find_by_id(&self, id: &TaskId) -> TaskRepositoryResult<Option<AnalysisTask>> {
        let state = self.read()?;
        Ok(state.tasks.get(id).cloned())
    }

    async fn find_active_for_application(
        &self,
        application_id: &ApplicationId,
    ) -> TaskRepositoryResult<Option<AnalysisTask>> {
        let state = self.read()?;
        let task = state
            .active_index
            .get(application_id)
            .and_then(|task_id| state.tasks.get(task_id))
            .cloned();
        Ok(task)
    }

    async fn update(&self, task: &AnalysisTask) -> TaskRepositoryResult<()> {
        let mut state = self.write()?;
        state.stored_status(task.id())?;
        state.ensure_no_other_active(task)?;
        state.write_task(task);
        Ok(())
    }

    async fn update_if_status(
        &self,
        task: &AnalysisTask,
        expected: TaskStatus,
    ) -> TaskRepositoryResult<bool> {
        let mut state = self.write()?;
        if state.stored_status(task.id())? != expected {
            return Ok(false);
        }
        state.ensure_no_other_active(task)?;
        state.write_task(task);
        Ok(true)
    }

    async fn claim(&self, task: &AnalysisTask) -> TaskRepositoryResult<bool> {
        if task.status() != TaskStatus::Processing || task.worker_id().is_none() {
            return Ok(false);
        }
        self.update_if_status(task, TaskStatus::Pending).await
    }

    async fn list_by_status(&self, status: TaskStatus) -> TaskRepositoryResult<Vec<AnalysisTask>> {
        let state = self.read()?;
        let mut tasks: Vec<AnalysisTask> = state
            .tasks
            .values()
            .filter(|task| task.status() == status)
            .cloned()
            .collect();
        tasks.sort_by_key(|task| task.timing().queued_at);
        Ok(tasks)
    }

    async fn count_by_status(&self, status: TaskStatus) -> TaskRepositoryResult<u64> {
        let state = self.read()?;
        let count = state
            .tasks
            .values()
            .filter(|task| task.status() == status)
            .count();
        Ok(u64::try_from(count).unwrap_or(u64::MAX))
    }
}
