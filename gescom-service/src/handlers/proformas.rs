//! Proforma handlers, including the conversion lifecycle.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gescom_core::capability::Role;
use gescom_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{
    InvoiceResponse, ListQuery, ProformaRequest, ProformaResponse, ProformaUpdateRequest,
};
use crate::middleware::AuthUser;
use crate::models::{ListProformasFilter, ProformaStatus};
use crate::services::metrics::DOCUMENTS_TOTAL;
use crate::startup::AppState;

pub async fn create_proforma(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(payload): Json<ProformaRequest>,
) -> Result<(StatusCode, Json<ProformaResponse>), AppError> {
    payload.validate()?;

    tracing::info!(user_id = %ctx.user_id, client_id = %payload.client_id, "Creating proforma");

    let proforma = state.db.create_proforma(&payload.into()).await?;
    let items = state.db.get_proforma_items(proforma.proforma_id).await?;

    DOCUMENTS_TOTAL.with_label_values(&["proforma", "draft"]).inc();

    Ok((StatusCode::CREATED, Json(ProformaResponse::new(proforma, items))))
}

pub async fn get_proforma(
    State(state): State<AppState>,
    Path(proforma_id): Path<Uuid>,
) -> Result<Json<ProformaResponse>, AppError> {
    let proforma = state
        .db
        .get_proforma(proforma_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;
    let items = state.db.get_proforma_items(proforma_id).await?;

    Ok(Json(ProformaResponse::new(proforma, items)))
}

pub async fn list_proformas(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ProformaResponse>>, AppError> {
    let filter = ListProformasFilter {
        status: query.status.as_deref().map(ProformaStatus::from_string),
        client_id: query.client_id,
        start_date: query.start_date,
        end_date: query.end_date,
        page_size: query.page_size,
        page_token: query.page_token,
    };
    let proformas = state.db.list_proformas(&filter).await?;

    Ok(Json(
        proformas
            .into_iter()
            .map(|p| ProformaResponse::new(p, vec![]))
            .collect(),
    ))
}

pub async fn update_proforma(
    State(state): State<AppState>,
    Path(proforma_id): Path<Uuid>,
    Json(payload): Json<ProformaUpdateRequest>,
) -> Result<Json<ProformaResponse>, AppError> {
    payload.validate()?;

    let proforma = state
        .db
        .update_proforma(proforma_id, &payload.into())
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;
    let items = state.db.get_proforma_items(proforma_id).await?;

    Ok(Json(ProformaResponse::new(proforma, items)))
}

pub async fn delete_proforma(
    State(state): State<AppState>,
    Path(proforma_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    let deleted = state.db.delete_proforma(proforma_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Proforma not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn send_proforma(
    State(state): State<AppState>,
    Path(proforma_id): Path<Uuid>,
) -> Result<Json<ProformaResponse>, AppError> {
    let proforma = state
        .db
        .send_proforma(proforma_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;

    DOCUMENTS_TOTAL.with_label_values(&["proforma", "sent"]).inc();

    Ok(Json(ProformaResponse::new(proforma, vec![])))
}

/// Approve a sent proforma. Elevated capability.
pub async fn approve_proforma(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(proforma_id): Path<Uuid>,
) -> Result<Json<ProformaResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let proforma = state
        .db
        .approve_proforma(proforma_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;

    DOCUMENTS_TOTAL.with_label_values(&["proforma", "approved"]).inc();

    Ok(Json(ProformaResponse::new(proforma, vec![])))
}

/// Reject a sent proforma. Elevated capability.
pub async fn reject_proforma(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(proforma_id): Path<Uuid>,
) -> Result<Json<ProformaResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let proforma = state
        .db
        .reject_proforma(proforma_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;

    DOCUMENTS_TOTAL.with_label_values(&["proforma", "rejected"]).inc();

    Ok(Json(ProformaResponse::new(proforma, vec![])))
}

/// Return an approved proforma to sent. Elevated capability.
pub async fn unapprove_proforma(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(proforma_id): Path<Uuid>,
) -> Result<Json<ProformaResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let proforma = state
        .db
        .unapprove_proforma(proforma_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;

    Ok(Json(ProformaResponse::new(proforma, vec![])))
}

/// Convert an approved proforma into a final invoice.
pub async fn convert_proforma(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(proforma_id): Path<Uuid>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    tracing::info!(user_id = %ctx.user_id, proforma_id = %proforma_id, "Converting proforma");

    let invoice = state
        .db
        .convert_proforma(proforma_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;
    let items = state.db.get_invoice_items(invoice.invoice_id).await?;

    DOCUMENTS_TOTAL.with_label_values(&["invoice", "unpaid"]).inc();

    Ok((StatusCode::CREATED, Json(InvoiceResponse::new(invoice, items))))
}

/// Undo a conversion: the linked final invoice is deleted and the
/// proforma returns to approved. Refused once payments exist.
pub async fn undo_conversion(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(proforma_id): Path<Uuid>,
) -> Result<Json<ProformaResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let proforma = state
        .db
        .undo_conversion(proforma_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;

    Ok(Json(ProformaResponse::new(proforma, vec![])))
}
