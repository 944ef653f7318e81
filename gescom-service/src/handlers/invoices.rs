//! Final invoice handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use gescom_core::capability::Role;
use gescom_core::error::AppError;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{InvoiceRequest, InvoiceResponse, ListQuery};
use crate::middleware::AuthUser;
use crate::models::{InvoiceStatus, ListInvoicesFilter};
use crate::services::metrics::DOCUMENTS_TOTAL;
use crate::startup::AppState;

pub async fn create_invoice(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Json(payload): Json<InvoiceRequest>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    payload.validate()?;

    tracing::info!(user_id = %ctx.user_id, client_id = %payload.client_id, "Creating invoice");

    let invoice = state.db.create_invoice(&payload.into()).await?;
    let items = state.db.get_invoice_items(invoice.invoice_id).await?;

    DOCUMENTS_TOTAL.with_label_values(&["invoice", "unpaid"]).inc();

    Ok((StatusCode::CREATED, Json(InvoiceResponse::new(invoice, items))))
}

pub async fn get_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    let invoice = state
        .db
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
    let items = state.db.get_invoice_items(invoice_id).await?;

    Ok(Json(InvoiceResponse::new(invoice, items)))
}

pub async fn list_invoices(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<InvoiceResponse>>, AppError> {
    let filter = ListInvoicesFilter {
        status: query.status.as_deref().map(InvoiceStatus::from_string),
        client_id: query.client_id,
        start_date: query.start_date,
        end_date: query.end_date,
        page_size: query.page_size,
        page_token: query.page_token,
    };
    let invoices = state.db.list_invoices(&filter).await?;

    Ok(Json(
        invoices
            .into_iter()
            .map(|i| InvoiceResponse::new(i, vec![]))
            .collect(),
    ))
}

/// Delete an unpaid invoice; its number returns to the recycling pool.
pub async fn delete_invoice(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let deleted = state.db.delete_invoice(invoice_id).await?;
    if !deleted {
        return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Settle an unpaid invoice in one step. Elevated capability.
pub async fn mark_invoice_paid(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let invoice = state
        .db
        .mark_invoice_paid(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    DOCUMENTS_TOTAL.with_label_values(&["invoice", "paid"]).inc();

    Ok(Json(InvoiceResponse::new(invoice, vec![])))
}

/// Cancel an unpaid invoice. Elevated capability.
pub async fn cancel_invoice(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let invoice = state
        .db
        .cancel_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    DOCUMENTS_TOTAL.with_label_values(&["invoice", "cancelled"]).inc();

    Ok(Json(InvoiceResponse::new(invoice, vec![])))
}

/// Credit an invoice. Elevated capability.
pub async fn credit_invoice(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let invoice = state
        .db
        .credit_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    DOCUMENTS_TOTAL.with_label_values(&["invoice", "credited"]).inc();

    Ok(Json(InvoiceResponse::new(invoice, vec![])))
}

/// Revert a paid, partially paid or cancelled invoice to unpaid,
/// recomputing the aggregates from the ledger. Elevated capability.
pub async fn revert_invoice(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<InvoiceResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let invoice = state
        .db
        .revert_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    Ok(Json(InvoiceResponse::new(invoice, vec![])))
}
