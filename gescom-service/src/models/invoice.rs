//! Final invoice model.
//!
//! The stored status only carries what cannot be derived: `unpaid` as the
//! neutral value plus the sticky administrative overrides `cancelled` and
//! `credited`. The status shown to callers is always recomputed from the
//! payment aggregates by [`InvoiceStatus::derived`].

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::CreateItem;

/// Final invoice status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvoiceStatus {
    Unpaid,
    Paid,
    PartiallyPaid,
    Cancelled,
    Credited,
}

impl InvoiceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvoiceStatus::Unpaid => "unpaid",
            InvoiceStatus::Paid => "paid",
            InvoiceStatus::PartiallyPaid => "partially_paid",
            InvoiceStatus::Cancelled => "cancelled",
            InvoiceStatus::Credited => "credited",
        }
    }

    pub fn from_string(s: &str) -> Self {
        match s {
            "paid" => InvoiceStatus::Paid,
            "partially_paid" => InvoiceStatus::PartiallyPaid,
            "cancelled" => InvoiceStatus::Cancelled,
            "credited" => InvoiceStatus::Credited,
            _ => InvoiceStatus::Unpaid,
        }
    }

    /// Sticky administrative overrides win over payment-derived status.
    pub fn is_sticky(&self) -> bool {
        matches!(self, InvoiceStatus::Cancelled | InvoiceStatus::Credited)
    }

    /// Compute the effective status from the stored override and the
    /// payment aggregates.
    pub fn derived(stored: InvoiceStatus, amount_paid: Decimal, total: Decimal) -> InvoiceStatus {
        if stored.is_sticky() {
            return stored;
        }
        if amount_paid >= total && total > Decimal::ZERO {
            InvoiceStatus::Paid
        } else if amount_paid > Decimal::ZERO {
            InvoiceStatus::PartiallyPaid
        } else {
            InvoiceStatus::Unpaid
        }
    }
}

/// Final invoice document.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Invoice {
    pub invoice_id: Uuid,
    pub number: String,
    /// Stored override only; see [`InvoiceStatus::derived`].
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
    pub amount_paid: Decimal,
    pub client_debt: Decimal,
    pub notes: Option<String>,
    pub proforma_id: Option<Uuid>,
    pub created_utc: DateTime<Utc>,
}

impl Invoice {
    /// Effective status for display and transition guards.
    pub fn derived_status(&self) -> InvoiceStatus {
        InvoiceStatus::derived(
            InvoiceStatus::from_string(&self.status),
            self.amount_paid,
            self.total,
        )
    }
}

/// Filter parameters for listing invoices.
#[derive(Debug, Clone, Default)]
pub struct ListInvoicesFilter {
    pub status: Option<InvoiceStatus>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

/// Input for creating a final invoice directly (without a proforma).
#[derive(Debug, Clone)]
pub struct CreateInvoice {
    pub client_id: Uuid,
    pub payment_method: String,
    pub purchase_order: Option<String>,
    pub issue_date: NaiveDate,
    pub notes: Option<String>,
    pub items: Vec<CreateItem>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    #[test]
    fn derived_status_follows_payment_aggregates() {
        let stored = InvoiceStatus::Unpaid;
        assert_eq!(
            InvoiceStatus::derived(stored, dec(0), dec(1000)),
            InvoiceStatus::Unpaid
        );
        assert_eq!(
            InvoiceStatus::derived(stored, dec(400), dec(1000)),
            InvoiceStatus::PartiallyPaid
        );
        assert_eq!(
            InvoiceStatus::derived(stored, dec(1000), dec(1000)),
            InvoiceStatus::Paid
        );
        assert_eq!(
            InvoiceStatus::derived(stored, dec(1200), dec(1000)),
            InvoiceStatus::Paid
        );
    }

    #[test]
    fn sticky_statuses_ignore_payments() {
        assert_eq!(
            InvoiceStatus::derived(InvoiceStatus::Cancelled, dec(1000), dec(1000)),
            InvoiceStatus::Cancelled
        );
        assert_eq!(
            InvoiceStatus::derived(InvoiceStatus::Credited, dec(400), dec(1000)),
            InvoiceStatus::Credited
        );
    }

    #[test]
    fn zero_total_invoice_is_not_paid_by_default() {
        assert_eq!(
            InvoiceStatus::derived(InvoiceStatus::Unpaid, dec(0), dec(0)),
            InvoiceStatus::Unpaid
        );
    }

    #[test]
    fn status_round_trips_through_storage() {
        for status in [
            InvoiceStatus::Unpaid,
            InvoiceStatus::Paid,
            InvoiceStatus::PartiallyPaid,
            InvoiceStatus::Cancelled,
            InvoiceStatus::Credited,
        ] {
            assert_eq!(InvoiceStatus::from_string(status.as_str()), status);
        }
    }
}
