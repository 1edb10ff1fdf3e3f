//! Priority queue of pending tasks.
//!
//! Tasks are ordered by `(priority, queue_position)`. New tasks take an
//! increasing position (back of their band); abandoned and re-prioritized
//! tasks take a decreasing one (front of their band). The position is
//! persisted with the task, so a restored queue keeps the same order.
//! Popped tasks move to the in-process set until they complete, are
//! cancelled, or are requeued.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use tracing::{info, warn};

use velo_core::{
    is_valid_commit_hash, Task, TaskCreationError, TaskId, TaskPriority, TaskSource,
};

use crate::error::{StoreError, TaskRejection};
use crate::store::TaskStore;

type QueueKey = (TaskPriority, i64, TaskId);

/// What `enqueue` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Inserted,
    /// The commit was already queued at the same or a more urgent priority.
    AlreadyQueued,
    /// The commit was already queued and moved to a more urgent band.
    Reprioritized,
}

/// A task removed by [`TaskQueue::cancel`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cancelled {
    Pending(Task),
    /// The task was assigned to a runner; that runner should be reset.
    InProcess(Task),
}

pub struct TaskQueue {
    pending: BTreeMap<QueueKey, Task>,
    keys: HashMap<TaskId, QueueKey>,
    in_process: HashMap<TaskId, Task>,
    next_back: i64,
    next_front: i64,
    store: Arc<dyn TaskStore>,
}

impl TaskQueue {
    /// Build the queue from whatever the store still holds.
    ///
    /// Tasks that were in process when the previous server stopped are
    /// pending again.
    pub fn new(store: Arc<dyn TaskStore>) -> Result<Self, StoreError> {
        let mut queue = Self {
            pending: BTreeMap::new(),
            keys: HashMap::new(),
            in_process: HashMap::new(),
            next_back: 0,
            next_front: -1,
            store,
        };
        let restored = queue.store.load_pending_tasks()?;
        if !restored.is_empty() {
            info!(count = restored.len(), "restored pending tasks");
        }
        for mut task in restored {
            task.in_process = false;
            queue.next_back = queue.next_back.max(task.queue_position + 1);
            queue.next_front = queue.next_front.min(task.queue_position - 1);
            queue.insert_pending(task);
        }
        Ok(queue)
    }

    fn insert_pending(&mut self, task: Task) {
        let key = (task.priority, task.queue_position, task.id);
        self.keys.insert(task.id, key);
        self.pending.insert(key, task);
    }

    fn take_back_position(&mut self) -> i64 {
        let position = self.next_back;
        self.next_back += 1;
        position
    }

    fn take_front_position(&mut self) -> i64 {
        let position = self.next_front;
        self.next_front -= 1;
        position
    }

    fn remove_pending(&mut self, id: TaskId) -> Option<Task> {
        let key = self.keys.remove(&id)?;
        self.pending.remove(&key)
    }

    /// Queue a new task, or fold it into an existing one for the same commit.
    ///
    /// A commit that is already queued is left alone unless the new priority
    /// is more urgent, in which case the existing task moves to the front of
    /// the more urgent band. A commit that is in process is rejected.
    pub fn enqueue(
        &mut self,
        source: TaskSource,
        priority: TaskPriority,
        author: impl Into<String>,
    ) -> Result<(Task, EnqueueOutcome), TaskRejection> {
        if let TaskSource::Commit { commit_hash, .. } = &source {
            if !is_valid_commit_hash(commit_hash) {
                return Err(TaskCreationError::caller(format!(
                    "'{commit_hash}' is not a commit hash"
                ))
                .into());
            }
        }

        if let Some(key) = source.commit_key() {
            if let Some(running) = self
                .in_process
                .values()
                .find(|t| t.source.commit_key() == Some(key))
            {
                return Err(TaskRejection::AlreadyInProgress(running.id));
            }

            let existing = self
                .pending
                .values()
                .find(|t| t.source.commit_key() == Some(key))
                .cloned();
            if let Some(existing) = existing {
                if priority >= existing.priority {
                    return Ok((existing, EnqueueOutcome::AlreadyQueued));
                }
                return self.reprioritize(existing, priority);
            }
        }

        let mut task = Task::new(source, priority, author);
        task.queue_position = self.next_back;
        self.store.persist_task_inserted(&task).map_err(|e| {
            TaskCreationError::internal(format!("could not persist task: {e}"))
        })?;
        self.take_back_position();
        info!(task_id = %task.id, source = %task.source, priority = %task.priority, "task enqueued");
        self.insert_pending(task.clone());
        Ok((task, EnqueueOutcome::Inserted))
    }

    fn reprioritize(
        &mut self,
        existing: Task,
        priority: TaskPriority,
    ) -> Result<(Task, EnqueueOutcome), TaskRejection> {
        let mut updated = existing.clone();
        updated.priority = priority;
        updated.queue_position = self.next_front;
        self.store.persist_task_inserted(&updated).map_err(|e| {
            TaskCreationError::internal(format!("could not persist task: {e}"))
        })?;
        self.remove_pending(existing.id);
        info!(
            task_id = %updated.id,
            from = %existing.priority,
            to = %priority,
            "task re-prioritized"
        );
        self.take_front_position();
        self.insert_pending(updated.clone());
        Ok((updated, EnqueueOutcome::Reprioritized))
    }

    /// Take the most urgent task and mark it in process.
    pub fn pop_next(&mut self) -> Option<Task> {
        let (_, mut task) = self.pending.pop_first()?;
        self.keys.remove(&task.id);
        task.in_process = true;
        self.in_process.insert(task.id, task.clone());
        Some(task)
    }

    /// Put an in-process task back at the front of its priority band.
    ///
    /// Returns false if the task is not in process (completed or cancelled
    /// meanwhile).
    pub fn requeue_front(&mut self, id: TaskId) -> bool {
        let Some(mut task) = self.in_process.remove(&id) else {
            return false;
        };
        task.in_process = false;
        task.queue_position = self.take_front_position();
        if let Err(e) = self.store.persist_task_inserted(&task) {
            warn!(task_id = %id, error = %e, "failed to persist requeued task position");
        }
        info!(task_id = %id, priority = %task.priority, "task requeued at front of its band");
        self.insert_pending(task);
        true
    }

    /// Finish an in-process task and drop it from the store.
    pub fn complete(&mut self, id: TaskId) -> Option<Task> {
        let task = self.in_process.remove(&id)?;
        if let Err(e) = self.store.persist_task_removed(id) {
            warn!(task_id = %id, error = %e, "failed to remove completed task from store");
        }
        Some(task)
    }

    pub fn cancel(&mut self, id: TaskId) -> Option<Cancelled> {
        let cancelled = if let Some(task) = self.remove_pending(id) {
            Cancelled::Pending(task)
        } else {
            Cancelled::InProcess(self.in_process.remove(&id)?)
        };
        if let Err(e) = self.store.persist_task_removed(id) {
            warn!(task_id = %id, error = %e, "failed to remove cancelled task from store");
        }
        info!(task_id = %id, "task cancelled");
        Some(cancelled)
    }

    /// Pending tasks in dispatch order.
    pub fn pending(&self) -> Vec<Task> {
        self.pending.values().cloned().collect()
    }

    pub fn in_process(&self) -> Vec<Task> {
        let mut tasks: Vec<Task> = self.in_process.values().cloned().collect();
        tasks.sort_by_key(|t| t.inserted_at);
        tasks
    }

    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.keys
            .get(&id)
            .and_then(|key| self.pending.get(key))
            .or_else(|| self.in_process.get(&id))
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty() && self.in_process.is_empty()
    }
}
