use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::services::reconcile::ReconcileError;

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Record write failed: {0}")]
    RecordWrite(String),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// API response wrapper
#[derive(Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub code: i32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            code: 0,
            message: "success".to_string(),
            data: Some(data),
        }
    }

    pub fn success_with_message(message: &str, data: T) -> Self {
        Self {
            code: 0,
            message: message.to_string(),
            data: Some(data),
        }
    }

    pub fn error(code: i32, message: &str) -> ApiResponse<()> {
        ApiResponse {
            code,
            message: message.to_string(),
            data: None,
        }
    }
}

impl AppError {
    fn status(&self) -> (StatusCode, i32) {
        match self {
            AppError::NotFound(_) => (StatusCode::NOT_FOUND, 404),
            AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, 400),
            AppError::Conflict(_) => (StatusCode::CONFLICT, 409),
            AppError::Json(_) => (StatusCode::BAD_REQUEST, 400),
            AppError::Reconcile(e) if e.is_validation() => (StatusCode::BAD_REQUEST, 400),
            AppError::Reconcile(_) => (StatusCode::BAD_GATEWAY, 502),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, 500),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status();

        let message = match &self {
            AppError::Database(e) => {
                tracing::error!("Database error: {:?}", e);
                "Database error".to_string()
            }
            AppError::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                msg.clone()
            }
            AppError::Storage(msg) => {
                tracing::error!("Storage error: {}", msg);
                msg.clone()
            }
            AppError::RecordWrite(msg) => {
                tracing::error!("Record write failed: {}", msg);
                format!("Failed to save record: {}", msg)
            }
            AppError::Io(e) => {
                tracing::error!("IO error: {:?}", e);
                "IO error".to_string()
            }
            AppError::Reconcile(e) => {
                if !e.is_validation() {
                    tracing::error!("Image reconcile failed: {}", e);
                }
                e.to_string()
            }
            AppError::NotFound(msg) | AppError::BadRequest(msg) | AppError::Conflict(msg) => {
                msg.clone()
            }
            AppError::Json(e) => format!("Invalid JSON: {}", e),
        };

        let body = Json(ApiResponse::<()>::error(code, &message));
        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
