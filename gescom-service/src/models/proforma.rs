//! Proforma invoice model and status machine.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::CreateItem;

/// Proforma status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProformaStatus {
    Draft,
    Sent,
    Approved,
    Rejected,
}

impl ProformaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProformaStatus::Draft => "draft",
            ProformaStatus::Sent => "sent",
            ProformaStatus::Approved => "approved",
            ProformaStatus::Rejected => "rejected",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "sent" => ProformaStatus::Sent,
            "approved" => ProformaStatus::Approved,
            "rejected" => ProformaStatus::Rejected,
            _ => ProformaStatus::Draft,
        }
    }

    /// draft -> sent.
    pub fn can_send(&self) -> bool {
        matches!(self, ProformaStatus::Draft)
    }

    /// sent -> approved | rejected. Elevated capability.
    pub fn can_review(&self) -> bool {
        matches!(self, ProformaStatus::Sent)
    }

    /// approved -> sent.
    pub fn can_unapprove(&self) -> bool {
        matches!(self, ProformaStatus::Approved)
    }

    /// Conversion requires approval; the at-most-one-final-invoice guard
    /// is enforced against the stored link, not the status.
    pub fn can_convert(&self) -> bool {
        matches!(self, ProformaStatus::Approved)
    }

    /// Only drafts can be edited or hard-deleted.
    pub fn can_modify(&self) -> bool {
        matches!(self, ProformaStatus::Draft)
    }
}

/// Proforma invoice document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Proforma {
    pub proforma_id: Uuid,
    pub number: String,
    pub status: String,
    pub client_id: Uuid,
    pub client_name: String,
    pub payment_method: String,
    pub purchase_order: Option<String>,
    pub issue_date: NaiveDate,
    pub subtotal: Decimal,
    pub tax_total: Decimal,
    pub stamp_tax: Decimal,
    pub total: Decimal,
    pub notes: Option<String>,
    pub final_invoice_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

/// Filter parameters for listing proformas.
#[derive(Debug, Clone, Default)]
pub struct ListProformasFilter {
    pub status: Option<ProformaStatus>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// Input for creating a proforma.
#[derive(Debug, Clone)]
pub struct CreateProforma {
    pub client_id: Uuid,
    pub payment_method: String,
    pub purchase_order: Option<String>,
    pub issue_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<CreateItem>,
}

/// Input for updating a draft proforma. A non-empty `items` list replaces
/// the existing rows and recomputes all derived money fields.
#[derive(Debug, Clone, Default)]
pub struct UpdateProforma {
    pub payment_method: Option<String>,
    pub purchase_order: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub notes: Option<String>,
    pub items: Option<Vec<CreateItem>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_follow_the_lifecycle() {
        assert!(ProformaStatus::Draft.can_send());
        assert!(!ProformaStatus::Sent.can_send());

        assert!(ProformaStatus::Sent.can_review());
        assert!(!ProformaStatus::Draft.can_review());
        assert!(!ProformaStatus::Rejected.can_review());

        assert!(ProformaStatus::Approved.can_unapprove());
        assert!(ProformaStatus::Approved.can_convert());
        assert!(!ProformaStatus::Sent.can_convert());

        assert!(ProformaStatus::Draft.can_modify());
        assert!(!ProformaStatus::Approved.can_modify());
    }

    #[test]
    fn status_round_trips_through_storage() {
        for status in [
            ProformaStatus::Draft,
            ProformaStatus::Sent,
            ProformaStatus::Approved,
            ProformaStatus::Rejected,
        ] {
            assert_eq!(ProformaStatus::from_string(status.as_str()), status);
        }
    }
}
