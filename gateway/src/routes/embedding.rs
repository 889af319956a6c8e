//! Embedding submission endpoints.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::{Json, Router};
use embed_dispatch_common::{
    BatchEmbeddingRequest, EmbeddingInput, EmbeddingRequest, TaskAccepted,
};

use crate::error::ApiError;
use crate::state::AppState;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/text_embedding", post(submit))
        .route("/text_embedding/batch", post(submit_batch))
}

/// POST /text_embedding - Queue one text for embedding.
async fn submit(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EmbeddingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let Json(request) = payload?;
    let input = EmbeddingInput {
        texts: vec![request.text],
        params: request.params,
    };
    let accepted = state.dispatcher.submit(&request.model_key, input).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}

/// POST /text_embedding/batch - Queue several texts as one task.
async fn submit_batch(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<BatchEmbeddingRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<TaskAccepted>), ApiError> {
    let Json(request) = payload?;
    let input = EmbeddingInput {
        texts: request.texts,
        params: request.params,
    };
    let accepted = state.dispatcher.submit(&request.model_key, input).await?;
    Ok((StatusCode::ACCEPTED, Json(accepted)))
}
