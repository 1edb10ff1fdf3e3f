//! Persistence boundary for pending tasks.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use tracing::info;

use velo_core::{Task, TaskId};

use crate::error::StoreError;

/// Durable record of queued tasks, used to rebuild the queue after a restart.
pub trait TaskStore: Send + Sync {
    fn load_pending_tasks(&self) -> Result<Vec<Task>, StoreError>;

    /// Record a new task, or overwrite one with the same id.
    fn persist_task_inserted(&self, task: &Task) -> Result<(), StoreError>;

    fn persist_task_removed(&self, id: TaskId) -> Result<(), StoreError>;
}

fn sorted(tasks: &HashMap<TaskId, Task>) -> Vec<Task> {
    let mut tasks: Vec<Task> = tasks.values().cloned().collect();
    tasks.sort_by(|a, b| {
        a.priority
            .cmp(&b.priority)
            .then(a.queue_position.cmp(&b.queue_position))
            .then(a.inserted_at.cmp(&b.inserted_at))
    });
    tasks
}

// ── In-memory ─────────────────────────────────────────────────

/// Keeps tasks for the lifetime of the process only.
#[derive(Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl MemoryTaskStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TaskStore for MemoryTaskStore {
    fn load_pending_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(sorted(&self.tasks.lock().unwrap_or_else(PoisonError::into_inner)))
    }

    fn persist_task_inserted(&self, task: &Task) -> Result<(), StoreError> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(task.id, task.clone());
        Ok(())
    }

    fn persist_task_removed(&self, id: TaskId) -> Result<(), StoreError> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        Ok(())
    }
}

// ── JSON file ─────────────────────────────────────────────────

/// Rewrites the whole queue to one JSON file on every change.
///
/// Writes go to a sibling temp file that is then renamed over the target,
/// so a crash mid-write leaves the previous version intact.
pub struct JsonFileTaskStore {
    path: PathBuf,
    tasks: Mutex<HashMap<TaskId, Task>>,
}

impl JsonFileTaskStore {
    /// Open the store, reading existing tasks if the file exists.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let tasks = if path.exists() {
            let raw = fs::read_to_string(&path)?;
            let list: Vec<Task> = if raw.trim().is_empty() {
                Vec::new()
            } else {
                serde_json::from_str(&raw)?
            };
            info!(path = %path.display(), count = list.len(), "loaded persisted queue");
            list.into_iter().map(|t| (t.id, t)).collect()
        } else {
            HashMap::new()
        };
        Ok(Self {
            path,
            tasks: Mutex::new(tasks),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write(&self, tasks: &HashMap<TaskId, Task>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&sorted(tasks))?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TaskStore for JsonFileTaskStore {
    fn load_pending_tasks(&self) -> Result<Vec<Task>, StoreError> {
        Ok(sorted(&self.tasks.lock().unwrap_or_else(PoisonError::into_inner)))
    }

    fn persist_task_inserted(&self, task: &Task) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        let previous = tasks.insert(task.id, task.clone());
        if let Err(e) = self.write(&tasks) {
            match previous {
                Some(prev) => tasks.insert(task.id, prev),
                None => tasks.remove(&task.id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn persist_task_removed(&self, id: TaskId) -> Result<(), StoreError> {
        let mut tasks = self.tasks.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(removed) = tasks.remove(&id) {
            if let Err(e) = self.write(&tasks) {
                tasks.insert(id, removed);
                return Err(e);
            }
        }
        Ok(())
    }
}
