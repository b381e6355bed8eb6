use axum::{extract::State, Json};
use serde::Serialize;

use crate::error::ApiResponse;
use crate::AppState;

#[derive(Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub records: &'static str,
    pub blobs: &'static str,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<ApiResponse<HealthStatus>> {
    Json(ApiResponse::success(HealthStatus {
        status: "ok",
        records: state.records.backend_name(),
        blobs: state.blobs.storage_type(),
    }))
}
