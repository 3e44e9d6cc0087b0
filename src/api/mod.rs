//! HTTP transport

pub mod error;
pub mod handlers;

use crate::service::PredictionService;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use error::{ApiError, ApiResult};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
}

/// Create the router with all routes
pub fn router(service: PredictionService, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/", get(handlers::info))
        .route("/health", get(handlers::health))
        .route("/features", get(handlers::features))
        .route("/metrics", get(handlers::metrics))
        .route("/predict", post(handlers::predict))
        .route("/predict/batch", post(handlers::predict_batch))
        .layer(DefaultBodyLimit::max(max_body_bytes))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(AppState { service })
}
