//! REST endpoints for task submission, queue inspection and runner status.

mod health;
mod queue;
mod runners;

#[cfg(test)]
mod tests;

pub use health::health;
pub use queue::{queue_cancel, queue_commit, queue_list, queue_tar};
pub use runners::runners_list;

use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use velo_dispatch::TaskRejection;

// ── Shared types ─────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
}

fn internal(e: impl std::fmt::Display) -> ApiError {
    tracing::error!(error = %e, "request failed");
    error(StatusCode::INTERNAL_SERVER_ERROR, "internal error")
}

fn rejection(e: TaskRejection) -> ApiError {
    match e {
        TaskRejection::AlreadyInProgress(_) => error(StatusCode::CONFLICT, e.to_string()),
        TaskRejection::Creation(e) if e.our_fault => {
            tracing::error!(error = %e, "task creation failed");
            error(StatusCode::INTERNAL_SERVER_ERROR, e.public_message())
        }
        TaskRejection::Creation(e) => error(StatusCode::BAD_REQUEST, e.public_message()),
    }
}
