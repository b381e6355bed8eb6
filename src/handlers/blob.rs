use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::Response,
};

use crate::error::{AppError, Result};
use crate::AppState;

/// Serve a stored image by its storage path
/// GET /blobs/*path
pub async fn get_blob(State(state): State<AppState>, Path(path): Path<String>) -> Result<Response> {
    let bytes = state.blobs.get(&path).await?;
    let content_type = mime_guess::from_path(&path).first_or_octet_stream();

    let response = Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type.as_ref())
        .header(header::CACHE_CONTROL, "public, max-age=31536000, immutable")
        .body(Body::from(bytes))
        .map_err(|e| AppError::Internal(format!("Failed to build response: {}", e)))?;

    Ok(response)
}
