//! Delivery note model.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::CreateItem;

/// Delivery note status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryNoteStatus {
    Pending,
    Delivered,
    Cancelled,
}

impl DeliveryNoteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryNoteStatus::Pending => "pending",
            DeliveryNoteStatus::Delivered => "delivered",
            DeliveryNoteStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "delivered" => DeliveryNoteStatus::Delivered,
            "cancelled" => DeliveryNoteStatus::Cancelled,
            _ => DeliveryNoteStatus::Pending,
        }
    }

    /// Editing, deletion and both transitions start from pending.
    pub fn can_modify(&self) -> bool {
        matches!(self, DeliveryNoteStatus::Pending)
    }
}

/// Delivery note document, optionally fulfilling a final invoice.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct DeliveryNote {
    pub delivery_note_id: Uuid,
    pub number: String,
    pub status: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub invoice_id: Option<Uuid>,
    pub issue_date: NaiveDate,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub created_utc: DateTime<Utc>,
}

/// Filter parameters for listing delivery notes.
#[derive(Debug, Clone, Default)]
pub struct ListDeliveryNotesFilter {
    pub status: Option<DeliveryNoteStatus>,
    pub client_id: Option<Uuid>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// Input for creating a delivery note.
#[derive(Debug, Clone)]
pub struct CreateDeliveryNote {
    pub client_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub issue_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<CreateItem>,
}

/// Input for updating a pending delivery note.
#[derive(Debug, Clone, Default)]
pub struct UpdateDeliveryNote {
    pub invoice_id: Option<Uuid>,
    pub issue_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Option<Vec<CreateItem>>,
}
