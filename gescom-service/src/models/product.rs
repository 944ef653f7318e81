//! Product catalog model.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// Catalog entry. `unit_price` and `tax_rate` are the defaults snapshotted
/// onto document items at creation time.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Product {
    pub product_id: Uuid,
    pub name: String,
    pub reference: Option<String>,
    pub unit_price: Decimal,
    /// Percent, 0-100.
    pub tax_rate: Decimal,
    pub stock_quantity: i32,
    pub unit: String,
    pub created_utc: DateTime<Utc>,
}

/// Filter parameters for listing products.
#[derive(Debug, Clone, Default)]
pub struct ListProductsFilter {
    pub search: Option<String>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// Input for creating a product.
#[derive(Debug, Clone)]
pub struct CreateProduct {
    pub name: String,
    pub reference: Option<String>,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub stock_quantity: i32,
    pub unit: String,
}

/// Input for updating a product.
#[derive(Debug, Clone, Default)]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub reference: Option<String>,
    pub unit_price: Option<Decimal>,
    pub tax_rate: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub unit: Option<String>,
}
