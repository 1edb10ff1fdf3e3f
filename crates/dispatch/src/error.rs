use thiserror::Error;

use velo_core::{TaskCreationError, TaskId};

/// Failures of the task persistence boundary.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("queue file I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("queue file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// A runner could not be registered.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RegistrationError {
    #[error("a runner named '{0}' is already connected")]
    NameTaken(String),
}

/// Why a task submission was refused.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TaskRejection {
    /// The same commit is currently being benchmarked.
    #[error("task {0} for this commit is already in progress")]
    AlreadyInProgress(TaskId),

    #[error(transparent)]
    Creation(#[from] TaskCreationError),
}
