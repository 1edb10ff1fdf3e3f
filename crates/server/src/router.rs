//! HTTP router construction.

use std::sync::Arc;

use axum::routing::{delete, get, post};
use axum::Router;
use tower_http::cors::CorsLayer;

use crate::state::AppState;
use crate::{api, runner_ws};

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        .route("/runner", get(runner_ws::runner_upgrade))
        .route("/api/runners", get(api::runners_list))
        .route("/api/queue", get(api::queue_list))
        .route("/api/queue/commit", post(api::queue_commit))
        .route("/api/queue/tar", post(api::queue_tar))
        .route("/api/queue/{task_id}", delete(api::queue_cancel))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
