use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use velo_core::{RepoId, Task, TaskId, TaskPriority, TaskSource};
use velo_dispatch::{CancelOutcome, EnqueueOutcome};

use super::{error, internal, rejection, ApiError};
use crate::state::AppState;

// ── Submission ────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct CommitTaskRequest {
    pub repo_id: RepoId,
    pub commit_hash: String,
    pub author: String,
    /// Defaults to `manual`.
    #[serde(default)]
    pub priority: Option<TaskPriority>,
}

#[derive(Debug, Deserialize)]
pub struct TarTaskRequest {
    pub description: String,
    pub author: String,
    #[serde(default)]
    pub repo_id: Option<RepoId>,
}

#[derive(Debug, Serialize)]
pub struct EnqueuedResponse {
    pub task: Task,
    /// `inserted`, `reprioritized` or `already_queued`.
    pub outcome: &'static str,
}

pub async fn queue_commit(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CommitTaskRequest>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    let source = TaskSource::commit(req.repo_id, req.commit_hash);
    let priority = req.priority.unwrap_or(TaskPriority::Manual);
    submit(&state, source, priority, req.author).await
}

/// Enqueue an uploaded archive. Uploads are always `user_created`.
pub async fn queue_tar(
    State(state): State<Arc<AppState>>,
    Json(req): Json<TarTaskRequest>,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    if req.description.trim().is_empty() {
        return Err(error(StatusCode::BAD_REQUEST, "invalid task: empty description"));
    }
    let source = TaskSource::Tar {
        description: req.description,
        repo_id: req.repo_id,
    };
    submit(&state, source, TaskPriority::UserCreated, req.author).await
}

async fn submit(
    state: &AppState,
    source: TaskSource,
    priority: TaskPriority,
    author: String,
) -> Result<(StatusCode, Json<EnqueuedResponse>), ApiError> {
    let (task, outcome) = state
        .with_dispatcher(move |d| d.submit(source, priority, &author))
        .await
        .map_err(internal)?
        .map_err(rejection)?;

    let (status, outcome) = match outcome {
        EnqueueOutcome::Inserted => (StatusCode::CREATED, "inserted"),
        EnqueueOutcome::Reprioritized => (StatusCode::OK, "reprioritized"),
        EnqueueOutcome::AlreadyQueued => (StatusCode::OK, "already_queued"),
    };
    Ok((status, Json(EnqueuedResponse { task, outcome })))
}

// ── Inspection ────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct QueueResponse {
    /// In dispatch order.
    pub pending: Vec<Task>,
    pub in_process: Vec<Task>,
}

pub async fn queue_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<QueueResponse>, ApiError> {
    state
        .with_dispatcher(|d| QueueResponse {
            pending: d.pending_tasks(),
            in_process: d.in_process_tasks(),
        })
        .await
        .map(Json)
        .map_err(internal)
}

// ── Cancellation ──────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub task: Task,
    /// `true` if a runner was working on it.
    pub was_in_process: bool,
    /// Runner that was sent a reset order.
    pub runner: Option<String>,
}

pub async fn queue_cancel(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<Uuid>,
) -> Result<Json<CancelResponse>, ApiError> {
    let id: TaskId = task_id;
    let outcome = state
        .with_dispatcher(move |d| d.cancel(id))
        .await
        .map_err(internal)?;

    match outcome {
        Some(CancelOutcome::Pending(task)) => Ok(Json(CancelResponse {
            task,
            was_in_process: false,
            runner: None,
        })),
        Some(CancelOutcome::InProcess { task, runner }) => Ok(Json(CancelResponse {
            task,
            was_in_process: true,
            runner,
        })),
        None => Err(error(StatusCode::NOT_FOUND, format!("no task {id}"))),
    }
}
