//! Delivery note handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gescom_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{DeliveryNoteRequest, DeliveryNoteResponse, DeliveryNoteUpdateRequest, ListQuery};
use crate::models::{DeliveryNoteStatus, ListDeliveryNotesFilter};
use crate::services::metrics::DOCUMENTS_TOTAL;
use crate::startup::AppState;

pub async fn create_delivery_note(
    State(state): State<AppState>,
    Json(payload): Json<DeliveryNoteRequest>,
) -> Result<(StatusCode, Json<DeliveryNoteResponse>), AppError> {
    payload.validate()?;

    let note = state.db.create_delivery_note(&payload.into()).await?;
    let items = state.db.get_delivery_note_items(note.delivery_note_id).await?;

    DOCUMENTS_TOTAL
        .with_label_values(&["delivery_note", "pending"])
        .inc();

    Ok((
        StatusCode::CREATED,
        Json(DeliveryNoteResponse::new(note, items)),
    ))
}

pub async fn get_delivery_note(
    State(state): State<AppState>,
    Path(delivery_note_id): Path<Uuid>,
) -> Result<Json<DeliveryNoteResponse>, AppError> {
    let note = state
        .db
        .get_delivery_note(delivery_note_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Delivery note not found")))?;
    let items = state.db.get_delivery_note_items(delivery_note_id).await?;

    Ok(Json(DeliveryNoteResponse::new(note, items)))
}

pub async fn list_delivery_notes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<DeliveryNoteResponse>>, AppError> {
    let filter = ListDeliveryNotesFilter {
        status: query.status.as_deref().map(DeliveryNoteStatus::from_string),
        client_id: query.client_id,
        page_size: query.page_size,
        page_token: query.page_token,
    };
    let notes = state.db.list_delivery_notes(&filter).await?;

    Ok(Json(
        notes
            .into_iter()
            .map(|n| DeliveryNoteResponse::new(n, vec![]))
            .collect(),
    ))
}

pub async fn update_delivery_note(
    State(state): State<AppState>,
    Path(delivery_note_id): Path<Uuid>,
    Json(payload): Json<DeliveryNoteUpdateRequest>,
) -> Result<Json<DeliveryNoteResponse>, AppError> {
    payload.validate()?;

    let note = state
        .db
        .update_delivery_note(delivery_note_id, &payload.into())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Delivery note not found")))?;
    let items = state.db.get_delivery_note_items(delivery_note_id).await?;

    Ok(Json(DeliveryNoteResponse::new(note, items)))
}

pub async fn delete_delivery_note(
    State(state): State<AppState>,
    Path(delivery_note_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_delivery_note(delivery_note_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!(
            "Delivery note not found"
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn deliver_delivery_note(
    State(state): State<AppState>,
    Path(delivery_note_id): Path<Uuid>,
) -> Result<Json<DeliveryNoteResponse>, AppError> {
    let note = state
        .db
        .deliver_delivery_note(delivery_note_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Delivery note not found")))?;

    DOCUMENTS_TOTAL
        .with_label_values(&["delivery_note", "delivered"])
        .inc();

    Ok(Json(DeliveryNoteResponse::new(note, vec![])))
}

pub async fn cancel_delivery_note(
    State(state): State<AppState>,
    Path(delivery_note_id): Path<Uuid>,
) -> Result<Json<DeliveryNoteResponse>, AppError> {
    let note = state
        .db
        .cancel_delivery_note(delivery_note_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Delivery note not found")))?;

    DOCUMENTS_TOTAL
        .with_label_values(&["delivery_note", "cancelled"])
        .inc();

    Ok(Json(DeliveryNoteResponse::new(note, vec![])))
}
