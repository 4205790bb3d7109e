use axum::extract::DefaultBodyLimit;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

use super::handler;
use super::AppState;

/// Build the axum router with all imgserve endpoints.
pub fn build_router(state: Arc<AppState>) -> Router {
    let body_limit = state.body_limit;
    Router::new()
        .route("/status", get(handler::status))
        .route("/metrics", get(handler::metrics))
        .route("/:namespace", post(handler::new_image))
        .route("/:namespace/:hash/process", post(handler::resize_many))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}
