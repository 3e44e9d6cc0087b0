//! HTTP handlers

use super::error::ApiResult;
use super::AppState;
use crate::error::PipelineError;
use crate::metrics::MetricsSnapshot;
use crate::service::{FeatureSpec, ServiceInfo};
use crate::types::{BatchPredictResponse, PredictResponse};
use axum::{body::Bytes, extract::State, Json};
use serde::Serialize;
use tokio::task::JoinError;
use tracing::error;
use uuid::Uuid;

#[derive(Serialize)]
pub struct HealthResponse {
    status: &'static str,
    version: &'static str,
    timestamp: i64,
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        timestamp: chrono::Utc::now().timestamp(),
    })
}

pub async fn info(State(state): State<AppState>) -> Json<ServiceInfo> {
    Json(state.service.info())
}

#[derive(Serialize)]
pub struct FeaturesResponse {
    count: usize,
    features: Vec<FeatureSpec>,
}

pub async fn features(State(state): State<AppState>) -> Json<FeaturesResponse> {
    let features = state.service.features();
    Json(FeaturesResponse {
        count: features.len(),
        features,
    })
}

pub async fn metrics(State(state): State<AppState>) -> Json<MetricsSnapshot> {
    Json(state.service.metrics().snapshot())
}

/// Single-record prediction
pub async fn predict(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<PredictResponse>> {
    let request_id = Uuid::new_v4().to_string();
    let service = state.service.clone();

    let response = tokio::task::spawn_blocking(move || service.predict_body(&request_id, &body))
        .await
        .map_err(|e| task_failed("prediction", e))??;

    Ok(Json(response))
}

/// Batch prediction; outputs are index-aligned with `records`
pub async fn predict_batch(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Json<BatchPredictResponse>> {
    let request_id = Uuid::new_v4().to_string();
    let service = state.service.clone();

    let response =
        tokio::task::spawn_blocking(move || service.predict_batch_body(&request_id, &body))
            .await
            .map_err(|e| task_failed("batch", e))??;

    Ok(Json(response))
}

fn task_failed(task: &str, err: JoinError) -> PipelineError {
    error!(task = task, error = %err, "Scoring task failed");
    PipelineError::Internal(format!("{} task failed: {}", task, err))
}
