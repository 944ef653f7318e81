//! Client handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gescom_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{ClientRequest, ClientResponse, ClientUpdateRequest, ListQuery};
use crate::startup::AppState;

pub async fn create_client(
    State(state): State<AppState>,
    Json(payload): Json<ClientRequest>,
) -> Result<(StatusCode, Json<ClientResponse>), AppError> {
    payload.validate()?;

    let client = state.db.create_client(&payload.into()).await?;

    Ok((StatusCode::CREATED, Json(client)))
}

pub async fn get_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<Json<ClientResponse>, AppError> {
    let client = state
        .db
        .get_client(client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    Ok(Json(client))
}

pub async fn list_clients(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ClientResponse>>, AppError> {
    let clients = state
        .db
        .list_clients(query.search.as_deref(), query.page_size, query.page_token)
        .await?;

    Ok(Json(clients))
}

pub async fn update_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
    Json(payload): Json<ClientUpdateRequest>,
) -> Result<Json<ClientResponse>, AppError> {
    payload.validate()?;

    let client = state
        .db
        .update_client(client_id, &payload.into())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    Ok(Json(client))
}

/// Delete a client. Fails with a conflict while invoices, proformas or
/// delivery notes still reference it.
pub async fn delete_client(
    State(state): State<AppState>,
    Path(client_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_client(client_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Client not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}
