//! Payment ledger handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use gescom_core::capability::Role;
use gescom_core::error::AppError;
use rust_decimal::prelude::ToPrimitive;
use uuid::Uuid;
use validator::Validate;

use crate::dtos::{InvoiceResponse, PaymentRecordedResponse, PaymentRequest, PaymentResponse};
use crate::middleware::AuthUser;
use crate::models::CreatePayment;
use crate::services::metrics::{PAYMENTS_TOTAL, PAYMENT_AMOUNT_TOTAL};
use crate::startup::AppState;

/// Record a payment. An amount above the remaining debt is clamped to it
/// and flagged in the response rather than rejected.
pub async fn add_payment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path(invoice_id): Path<Uuid>,
    Json(payload): Json<PaymentRequest>,
) -> Result<(StatusCode, Json<PaymentRecordedResponse>), AppError> {
    payload.validate()?;

    tracing::info!(
        user_id = %ctx.user_id,
        invoice_id = %invoice_id,
        amount = %payload.amount,
        "Recording payment"
    );

    let input = CreatePayment {
        invoice_id,
        amount: payload.amount,
        payment_date: payload.payment_date,
        method: payload.method,
        reference: payload.reference,
        notes: payload.notes,
    };

    let outcome = state
        .db
        .add_payment(&input)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    PAYMENTS_TOTAL
        .with_label_values(&[outcome.payment.method.as_str()])
        .inc();
    if let Some(amount) = outcome.payment.amount.to_f64() {
        PAYMENT_AMOUNT_TOTAL
            .with_label_values(&[outcome.payment.method.as_str()])
            .inc_by(amount);
    }

    let notice = outcome.clamped.then(|| {
        format!(
            "Payment was reduced to the remaining debt of {}",
            outcome.payment.amount
        )
    });

    Ok((
        StatusCode::CREATED,
        Json(PaymentRecordedResponse {
            payment: outcome.payment,
            clamped: outcome.clamped,
            notice,
            invoice: InvoiceResponse::new(outcome.invoice, vec![]),
        }),
    ))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<Vec<PaymentResponse>>, AppError> {
    if state.db.get_invoice(invoice_id).await?.is_none() {
        return Err(AppError::NotFound(anyhow::anyhow!("Invoice not found")));
    }

    let payments = state.db.list_payments(invoice_id).await?;

    Ok(Json(payments))
}

/// Delete a payment; the invoice aggregates are recomputed in the same
/// transaction. Elevated capability.
pub async fn delete_payment(
    State(state): State<AppState>,
    AuthUser(ctx): AuthUser,
    Path((invoice_id, payment_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<InvoiceResponse>, AppError> {
    state.capability_checker.require(&ctx, &[Role::Admin])?;

    let invoice = state
        .db
        .delete_payment(invoice_id, payment_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;

    Ok(Json(InvoiceResponse::new(invoice, vec![])))
}
