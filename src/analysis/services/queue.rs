//! Priority-ordered ready queue.

use crate::analysis::domain::{TaskId, TaskPriority};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    rank: u8,
    queued_at: DateTime<Utc>,
    sequence: u64,
}

/// Tasks waiting for a worker.
///
/// Dequeue order is strict priority, then `queued_at`, then insertion
/// order. Each task appears at most once.
#[derive(Debug, Default)]
pub struct ReadyQueue {
    entries: BTreeMap<QueueKey, TaskId>,
    keys: HashMap<TaskId, QueueKey>,
    next_sequence: u64,
}

impl ReadyQueue {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a task and returns its 1-based position.
    ///
    /// A task already in the queue keeps its place.
    pub fn push(
        &mut self,
        task_id: TaskId,
        priority: TaskPriority,
        queued_at: DateTime<Utc>,
    ) -> usize {
        if let Some(position) = self.position(&task_id) {
            return position;
        }
        let key = QueueKey {
            rank: priority.rank(),
            queued_at,
            sequence: self.next_sequence,
        };
        self.next_sequence = self.next_sequence.wrapping_add(1);
        self.entries.insert(key, task_id.clone());
        self.keys.insert(task_id, key);
        self.entries.range(..key).count() + 1
    }

    /// Removes and returns the next task to run.
    pub fn pop(&mut self) -> Option<TaskId> {
        let (_, task_id) = self.entries.pop_first()?;
        self.keys.remove(&task_id);
        Some(task_id)
    }

    /// Removes a task, returning `true` when it was queued.
    pub fn remove(&mut self, task_id: &TaskId) -> bool {
        self.keys
            .remove(task_id)
            .is_some_and(|key| self.entries.remove(&key).is_some())
    }

    /// Returns the 1-based position of a queued task.
    #[must_use]
    pub fn position(&self, task_id: &TaskId) -> Option<usize> {
        let key = self.keys.get(task_id)?;
        Some(self.entries.range(..*key).count() + 1)
    }

    /// Returns `true` when the task is queued.
    #[must_use]
    pub fn contains(&self, task_id: &TaskId) -> bool {
        self.keys.contains_key(task_id)
    }

    /// Returns the number of queued tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` when no task is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
