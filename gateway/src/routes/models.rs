//! Model discovery endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use embed_dispatch_common::ModelInfo;

use crate::state::AppState;

/// Build the models router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/text_embedding/models", get(list_models))
}

/// GET /text_embedding/models - List the embedding models and their queues.
async fn list_models(State(state): State<Arc<AppState>>) -> Json<Vec<ModelInfo>> {
    Json(state.registry.list().into_iter().map(ModelInfo::from).collect())
}
