use axum::{
    extract::{Path, State},
    Json,
};

use crate::error::{ApiResponse, Result};
use crate::models::{InboxItem, InboxKind};
use crate::AppState;

/// List an inbox, newest first
/// GET /api/v1/inbox/:kind
pub async fn list_inbox(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<ApiResponse<Vec<InboxItem>>>> {
    let kind = InboxKind::parse(&kind)?;
    let items = state.inbox.list(kind).await?;
    Ok(Json(ApiResponse::success(items)))
}

/// Delete one inbox item
/// DELETE /api/v1/inbox/:kind/:id
pub async fn delete_inbox_item(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<()>>> {
    let kind = InboxKind::parse(&kind)?;
    state.inbox.delete(kind, &id).await?;
    Ok(Json(ApiResponse::success_with_message("Deleted successfully!", ())))
}
