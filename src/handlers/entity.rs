use axum::{
    extract::{multipart::Field, Multipart, Path, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::{ApiResponse, AppError, Result};
use crate::models::{
    DeleteReport, EntityForm, EntityKind, EntityRecord, ImageEdit, PendingImage, SaveResponse,
};
use crate::AppState;

/// Name of the multipart part carrying the JSON fields
const FIELDS_PART: &str = "fields";

/// List all records of a kind
/// GET /api/v1/entities/:kind
pub async fn list_entities(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Json<ApiResponse<Vec<EntityRecord>>>> {
    let kind = EntityKind::parse(&kind)?;
    let records = state.entities.list(kind).await?;
    Ok(Json(ApiResponse::success(records)))
}

/// Get one record
/// GET /api/v1/entities/:kind/:id
pub async fn get_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<EntityRecord>>> {
    let kind = EntityKind::parse(&kind)?;
    let record = state.entities.get(kind, &id).await?;
    Ok(Json(ApiResponse::success(record)))
}

/// Create a record from a multipart form
/// POST /api/v1/entities/:kind
pub async fn create_entity(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<SaveResponse>>> {
    let kind = EntityKind::parse(&kind)?;
    let form = read_form(multipart).await?;
    let saved = state.entities.create(kind, form).await?;

    let message = format!("{} added successfully!", kind.label());
    Ok(Json(ApiResponse::success_with_message(&message, saved)))
}

/// Update a record from a multipart form
/// PUT /api/v1/entities/:kind/:id
pub async fn update_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<SaveResponse>>> {
    let kind = EntityKind::parse(&kind)?;
    let form = read_form(multipart).await?;
    let saved = state.entities.update(kind, &id, form).await?;

    let message = format!("{} updated successfully!", kind.label());
    Ok(Json(ApiResponse::success_with_message(&message, saved)))
}

/// Delete a record and its images
/// DELETE /api/v1/entities/:kind/:id
pub async fn delete_entity(
    State(state): State<AppState>,
    Path((kind, id)): Path<(String, String)>,
) -> Result<Json<ApiResponse<DeleteReport>>> {
    let kind = EntityKind::parse(&kind)?;
    let report = state.entities.delete(kind, &id).await?;

    let message = format!("{} deleted successfully!", kind.label());
    Ok(Json(ApiResponse::success_with_message(&message, report)))
}

/// Live list of a kind as Server-Sent Events; one `snapshot` event per change
/// GET /api/v1/entities/:kind/stream
pub async fn stream_entities(
    State(state): State<AppState>,
    Path(kind): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let kind = EntityKind::parse(&kind)?;
    let (tx, rx) = mpsc::unbounded_channel::<Vec<EntityRecord>>();

    let subscription = state
        .entities
        .subscribe(kind, move |records| {
            // Receiver gone means the client disconnected; the stream drop unsubscribes
            let _ = tx.send(records);
        })
        .await?;
    tracing::debug!("SSE client subscribed to {}", kind.as_str());

    let stream = UnboundedReceiverStream::new(rx).filter_map(move |records| {
        let _live = &subscription;
        let event = match Event::default().event("snapshot").json_data(&records) {
            Ok(event) => Some(Ok(event)),
            Err(e) => {
                tracing::warn!("Failed to encode {} snapshot: {}", kind.as_str(), e);
                None
            }
        };
        futures::future::ready(event)
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// Parse the entity multipart convention.
///
/// `fields` holds the JSON fields. Every other part is named after an image
/// slot and read in order: a file adds an image, a text value keeps the
/// persisted image with that storage path, and an empty value only marks the
/// slot as submitted (which clears it when nothing else follows).
async fn read_form(mut multipart: Multipart) -> Result<EntityForm> {
    let mut fields = None;
    let mut form = EntityForm::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(format!("Failed to process multipart: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        if name.is_empty() {
            return Err(AppError::BadRequest("Multipart part without a name".to_string()));
        }

        if name == FIELDS_PART {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read fields: {}", e)))?;
            fields = Some(serde_json::from_str(&text)?);
            continue;
        }

        let edit = read_image_part(field).await?;
        let edits = form.images.entry(name).or_default();
        if let Some(edit) = edit {
            edits.push(edit);
        }
    }

    form.fields = fields.ok_or_else(|| AppError::BadRequest("Missing 'fields' part".to_string()))?;
    Ok(form)
}

async fn read_image_part(field: Field<'_>) -> Result<Option<ImageEdit>> {
    let file_name = field.file_name().map(|s| s.to_string());
    let content_type = field.content_type().map(|s| s.to_string());

    match file_name {
        Some(file_name) => {
            let data = field
                .bytes()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read upload: {}", e)))?;
            // Browsers send an empty file part for an untouched file input
            if file_name.is_empty() && data.is_empty() {
                return Ok(None);
            }
            Ok(Some(ImageEdit::Add(PendingImage::new(file_name, content_type, data))))
        }
        None => {
            let text = field
                .text()
                .await
                .map_err(|e| AppError::BadRequest(format!("Failed to read part: {}", e)))?;
            let path = text.trim();
            if path.is_empty() {
                Ok(None)
            } else {
                Ok(Some(ImageEdit::Keep(path.to_string())))
            }
        }
    }
}
