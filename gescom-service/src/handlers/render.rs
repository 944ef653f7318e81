//! Render-field export for the document templating collaborator.
//!
//! Templates consume a flat key-value map plus an item-row list; no
//! substitution happens here.

use axum::{
    extract::{Path, State},
    Json,
};
use gescom_core::error::AppError;
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::models::{Client, DocumentItem};
use crate::startup::AppState;

/// One template row for the item-loop construct.
#[derive(Debug, Serialize)]
pub struct RenderItemRow {
    pub name: String,
    pub quantity: String,
    pub unit_price: String,
    pub tax_rate: String,
    pub discount: String,
    pub total: String,
}

/// Flat fields plus item rows, as consumed by the templating engine.
#[derive(Debug, Serialize)]
pub struct RenderDocumentResponse {
    pub fields: BTreeMap<String, String>,
    pub items: Vec<RenderItemRow>,
}

fn money(value: Decimal) -> String {
    value.round_dp(2).to_string()
}

fn client_fields(fields: &mut BTreeMap<String, String>, client: &Client) {
    fields.insert("client.name".into(), client.name.clone());
    fields.insert(
        "client.address".into(),
        client.address.clone().unwrap_or_default(),
    );
    fields.insert("client.city".into(), client.city.clone().unwrap_or_default());
    fields.insert(
        "client.phone".into(),
        client.phone.clone().unwrap_or_default(),
    );
    fields.insert(
        "client.email".into(),
        client.email.clone().unwrap_or_default(),
    );
    fields.insert(
        "client.tax_id".into(),
        client.tax_id.clone().unwrap_or_default(),
    );
    fields.insert(
        "client.trade_register".into(),
        client.trade_register.clone().unwrap_or_default(),
    );
    fields.insert(
        "client.tax_article".into(),
        client.tax_article.clone().unwrap_or_default(),
    );
    fields.insert(
        "client.statistical_id".into(),
        client.statistical_id.clone().unwrap_or_default(),
    );
    fields.insert(
        "client.bank_account".into(),
        client.bank_account.clone().unwrap_or_default(),
    );
}

fn item_rows(items: &[DocumentItem]) -> Vec<RenderItemRow> {
    items
        .iter()
        .map(|item| RenderItemRow {
            name: item.name.clone(),
            quantity: item.quantity.to_string(),
            unit_price: money(item.unit_price),
            tax_rate: item.tax_rate.to_string(),
            discount: item.discount.to_string(),
            total: money(item.total),
        })
        .collect()
}

pub async fn render_invoice(
    State(state): State<AppState>,
    Path(invoice_id): Path<Uuid>,
) -> Result<Json<RenderDocumentResponse>, AppError> {
    let invoice = state
        .db
        .get_invoice(invoice_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Invoice not found")))?;
    let items = state.db.get_invoice_items(invoice_id).await?;
    let client = state
        .db
        .get_client(invoice.client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    let mut fields = BTreeMap::new();
    fields.insert("number".into(), invoice.number.clone());
    fields.insert("status".into(), invoice.derived_status().as_str().to_string());
    fields.insert("issue_date".into(), invoice.issue_date.to_string());
    fields.insert("payment_method".into(), invoice.payment_method.clone());
    fields.insert(
        "purchase_order".into(),
        invoice.purchase_order.clone().unwrap_or_default(),
    );
    fields.insert("subtotal".into(), money(invoice.subtotal));
    fields.insert("tax_total".into(), money(invoice.tax_total));
    fields.insert("stamp_tax".into(), money(invoice.stamp_tax));
    fields.insert("total".into(), money(invoice.total));
    fields.insert("amount_paid".into(), money(invoice.amount_paid));
    fields.insert("client_debt".into(), money(invoice.client_debt));
    fields.insert("notes".into(), invoice.notes.clone().unwrap_or_default());
    client_fields(&mut fields, &client);

    Ok(Json(RenderDocumentResponse {
        fields,
        items: item_rows(&items),
    }))
}

pub async fn render_proforma(
    State(state): State<AppState>,
    Path(proforma_id): Path<Uuid>,
) -> Result<Json<RenderDocumentResponse>, AppError> {
    let proforma = state
        .db
        .get_proforma(proforma_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Proforma not found")))?;
    let items = state.db.get_proforma_items(proforma_id).await?;
    let client = state
        .db
        .get_client(proforma.client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    let mut fields = BTreeMap::new();
    fields.insert("number".into(), proforma.number.clone());
    fields.insert("status".into(), proforma.status.clone());
    fields.insert("issue_date".into(), proforma.issue_date.to_string());
    fields.insert("payment_method".into(), proforma.payment_method.clone());
    fields.insert(
        "purchase_order".into(),
        proforma.purchase_order.clone().unwrap_or_default(),
    );
    fields.insert("subtotal".into(), money(proforma.subtotal));
    fields.insert("tax_total".into(), money(proforma.tax_total));
    fields.insert("stamp_tax".into(), money(proforma.stamp_tax));
    fields.insert("total".into(), money(proforma.total));
    fields.insert("notes".into(), proforma.notes.clone().unwrap_or_default());
    client_fields(&mut fields, &client);

    Ok(Json(RenderDocumentResponse {
        fields,
        items: item_rows(&items),
    }))
}

pub async fn render_delivery_note(
    State(state): State<AppState>,
    Path(delivery_note_id): Path<Uuid>,
) -> Result<Json<RenderDocumentResponse>, AppError> {
    let note = state
        .db
        .get_delivery_note(delivery_note_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Delivery note not found")))?;
    let items = state.db.get_delivery_note_items(delivery_note_id).await?;
    let client = state
        .db
        .get_client(note.client_id)
        .await?
        .ok_or_else(|| AppError::NotFound(anyhow::anyhow!("Client not found")))?;

    let mut fields = BTreeMap::new();
    fields.insert("number".into(), note.number.clone());
    fields.insert("status".into(), note.status.clone());
    fields.insert("issue_date".into(), note.issue_date.to_string());
    fields.insert("subtotal".into(), money(note.subtotal));
    fields.insert("tax_total".into(), money(note.tax_total));
    fields.insert("total".into(), money(note.total));
    fields.insert("notes".into(), note.notes.clone().unwrap_or_default());
    if let Some(invoice_id) = note.invoice_id {
        if let Some(invoice) = state.db.get_invoice(invoice_id).await? {
            fields.insert("invoice_number".into(), invoice.number);
        }
    }
    client_fields(&mut fields, &client);

    Ok(Json(RenderDocumentResponse {
        fields,
        items: item_rows(&items),
    }))
}
