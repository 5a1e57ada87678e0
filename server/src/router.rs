//! Axum route table for the external interface (§6), shared between the
//! `serve` binary and integration tests.

use crate::api;
use crate::state::AppState;
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health_handler))
        .route("/suggest", get(api::suggest_handler))
        .route("/search", get(api::search_handler))
        .route("/file", get(api::file_handler))
        .route("/files", get(api::files_handler))
        .route("/update", post(api::update_handler))
        .route("/agent", post(api::agent_handler))
        .route("/agent_stream", get(api::agent_stream_handler))
        .route("/config", get(api::get_config_handler).post(api::update_config_handler))
        .route("/init_status", get(api::init_status_handler))
        .layer(CorsLayer::permissive())
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
