//! Task status endpoint.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use embed_dispatch_common::TaskStatusResponse;

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/tasks/:task_id", get(get_task))
}

/// GET /tasks/:task_id - Poll a task's status and result.
async fn get_task(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    let status = state.resolver.get_status(&task_id).await?;
    Ok(Json(status))
}
