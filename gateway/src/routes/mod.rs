//! HTTP API routes.

pub mod embedding;
pub mod health;
pub mod models;
pub mod tasks;

use std::sync::Arc;

use axum::Router;

use crate::state::AppState;

/// Build the API router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(health::router())
        .merge(models::router())
        .merge(embedding::router())
        .merge(tasks::router())
}
