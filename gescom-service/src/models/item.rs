//! Document line item model.
//!
//! The same row shape backs proforma, final-invoice and delivery-note
//! items; each document type has its own table.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Line item on a document. Unit price and tax rate are snapshots taken
/// from the product at insertion; the three money fields are derived by
/// the calculator and recomputed on every write.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DocumentItem {
    pub item_id: Uuid,
    pub document_id: Uuid,
    pub product_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    /// Percent, 0-100.
    pub tax_rate: Decimal,
    /// Percent of the line subtotal, 0-100.
    pub discount: Decimal,
    pub total_excl: Decimal,
    pub total_tax: Decimal,
    pub total: Decimal,
    pub sort_order: i32,
    pub created_utc: DateTime<Utc>,
}

/// Input for a line item on document creation or update.
#[derive(Debug, Clone)]
pub struct CreateItem {
    pub product_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub discount: Decimal,
    pub sort_order: i32,
}
