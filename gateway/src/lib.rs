//! embed-dispatch gateway
//!
//! HTTP surface over the task dispatcher and result resolver, plus the
//! process wiring that hosts the embedding worker pool.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod logging;
pub mod resolver;
pub mod routes;
pub mod state;
pub mod sweeper;

#[cfg(test)]
mod test_util;

pub use config::Config;
pub use dispatcher::{DispatchError, TaskDispatcher};
pub use error::ApiError;
pub use resolver::{ResolveError, ResultResolver};
pub use state::AppState;

use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Build the application router with its middleware stack.
pub fn app(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    routes::router()
        .layer(axum::middleware::from_fn(logging::request_logger))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
