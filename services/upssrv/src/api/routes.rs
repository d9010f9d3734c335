//! Router assembly

use axum::{middleware, routing::get, Router};
use std::sync::Arc;

use crate::api::handlers;
use crate::core::coordinator::Coordinator;

/// State shared by all handlers
#[derive(Debug, Clone)]
pub struct AppState {
    pub coordinator: Arc<Coordinator>,
    pub metrics_path: String,
    pub version: String,
}

impl AppState {
    pub fn new(coordinator: Arc<Coordinator>, metrics_path: impl Into<String>) -> Self {
        Self {
            coordinator,
            metrics_path: metrics_path.into(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Create the HTTP router
///
/// The metrics route is mounted at the configured path, which
/// `Config::validate` keeps clear of `/` and `/health`.
pub fn create_router(state: AppState) -> Router {
    let metrics_path = state.metrics_path.clone();
    Router::new()
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        .route(&metrics_path, get(handlers::metrics))
        // Apply HTTP request logging middleware
        .layer(middleware::from_fn(common::logging::http_request_logger))
        .with_state(state)
}
