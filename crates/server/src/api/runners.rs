use std::sync::Arc;

use axum::extract::State;
use axum::Json;

use velo_dispatch::RunnerSummary;

use super::{internal, ApiError};
use crate::state::AppState;

/// Every connected runner, by name.
pub async fn runners_list(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<RunnerSummary>>, ApiError> {
    state
        .with_dispatcher(|d| d.runners())
        .await
        .map(Json)
        .map_err(internal)
}
