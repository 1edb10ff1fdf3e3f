use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub runners: usize,
    pub pending_tasks: usize,
}

pub async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let (runners, pending_tasks) = state
        .with_dispatcher(|d| (d.runners().len(), d.pending_tasks().len()))
        .await
        .unwrap_or_default();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        runners,
        pending_tasks,
    })
}
