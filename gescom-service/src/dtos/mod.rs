//! Request and response DTOs for the HTTP API.
//!
//! Validation happens here, before any datastore work. Money fields are
//! `Decimal`, so percentage bounds use custom validators.

use crate::models::{
    Client, CreateClient, CreateDeliveryNote, CreateInvoice, CreateItem, CreateProduct,
    CreateProforma, DeliveryNote, DocumentItem, Invoice, Payment, Product, Proforma,
    UpdateDeliveryNote, UpdateProforma,
};
use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO {
        return Err(ValidationError::new("must not be negative"));
    }
    Ok(())
}

fn validate_percent(value: &Decimal) -> Result<(), ValidationError> {
    if *value < Decimal::ZERO || *value > Decimal::ONE_HUNDRED {
        return Err(ValidationError::new("must be between 0 and 100"));
    }
    Ok(())
}

fn validate_positive(value: &Decimal) -> Result<(), ValidationError> {
    if *value <= Decimal::ZERO {
        return Err(ValidationError::new("must be positive"));
    }
    Ok(())
}

// -----------------------------------------------------------------------------
// Requests
// -----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Validate)]
pub struct ClientRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub trade_register: Option<String>,
    pub tax_article: Option<String>,
    pub statistical_id: Option<String>,
    pub bank_account: Option<String>,
}

impl From<ClientRequest> for CreateClient {
    fn from(req: ClientRequest) -> Self {
        CreateClient {
            name: req.name,
            address: req.address,
            city: req.city,
            phone: req.phone,
            email: req.email,
            tax_id: req.tax_id,
            trade_register: req.trade_register,
            tax_article: req.tax_article,
            statistical_id: req.statistical_id,
            bank_account: req.bank_account,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ClientUpdateRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub phone: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    pub tax_id: Option<String>,
    pub trade_register: Option<String>,
    pub tax_article: Option<String>,
    pub statistical_id: Option<String>,
    pub bank_account: Option<String>,
}

impl From<ClientUpdateRequest> for crate::models::UpdateClient {
    fn from(req: ClientUpdateRequest) -> Self {
        crate::models::UpdateClient {
            name: req.name,
            address: req.address,
            city: req.city,
            phone: req.phone,
            email: req.email,
            tax_id: req.tax_id,
            trade_register: req.trade_register,
            tax_article: req.tax_article,
            statistical_id: req.statistical_id,
            bank_account: req.bank_account,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProductRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    pub reference: Option<String>,
    #[validate(custom(function = validate_non_negative))]
    pub unit_price: Decimal,
    #[validate(custom(function = validate_percent))]
    pub tax_rate: Decimal,
    #[serde(default)]
    pub stock_quantity: i32,
    #[serde(default = "default_unit")]
    pub unit: String,
}

fn default_unit() -> String {
    "piece".to_string()
}

impl From<ProductRequest> for CreateProduct {
    fn from(req: ProductRequest) -> Self {
        CreateProduct {
            name: req.name,
            reference: req.reference,
            unit_price: req.unit_price,
            tax_rate: req.tax_rate,
            stock_quantity: req.stock_quantity,
            unit: req.unit,
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProductUpdateRequest {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    pub reference: Option<String>,
    #[validate(custom(function = validate_non_negative))]
    pub unit_price: Option<Decimal>,
    #[validate(custom(function = validate_percent))]
    pub tax_rate: Option<Decimal>,
    pub stock_quantity: Option<i32>,
    pub unit: Option<String>,
}

impl From<ProductUpdateRequest> for crate::models::UpdateProduct {
    fn from(req: ProductUpdateRequest) -> Self {
        crate::models::UpdateProduct {
            name: req.name,
            reference: req.reference,
            unit_price: req.unit_price,
            tax_rate: req.tax_rate,
            stock_quantity: req.stock_quantity,
            unit: req.unit,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ItemRequest {
    pub product_id: Option<Uuid>,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    #[validate(custom(function = validate_non_negative))]
    pub unit_price: Decimal,
    #[validate(custom(function = validate_percent))]
    pub tax_rate: Decimal,
    #[serde(default)]
    #[validate(custom(function = validate_percent))]
    pub discount: Decimal,
    #[serde(default)]
    pub sort_order: i32,
}

impl From<ItemRequest> for CreateItem {
    fn from(req: ItemRequest) -> Self {
        CreateItem {
            product_id: req.product_id,
            name: req.name,
            quantity: req.quantity,
            unit_price: req.unit_price,
            tax_rate: req.tax_rate,
            discount: req.discount,
            sort_order: req.sort_order,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ProformaRequest {
    pub client_id: Uuid,
    pub payment_method: String,
    pub purchase_order: Option<String>,
    pub issue_date: NaiveDate,
    pub notes: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<ItemRequest>,
}

impl From<ProformaRequest> for CreateProforma {
    fn from(req: ProformaRequest) -> Self {
        CreateProforma {
            client_id: req.client_id,
            payment_method: req.payment_method,
            purchase_order: req.purchase_order,
            issue_date: req.issue_date,
            notes: req.notes,
            items: req.items.into_iter().map(CreateItem::from).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct ProformaUpdateRequest {
    pub payment_method: Option<String>,
    pub purchase_order: Option<String>,
    pub issue_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate(nested)]
    pub items: Option<Vec<ItemRequest>>,
}

impl From<ProformaUpdateRequest> for UpdateProforma {
    fn from(req: ProformaUpdateRequest) -> Self {
        UpdateProforma {
            payment_method: req.payment_method,
            purchase_order: req.purchase_order,
            issue_date: req.issue_date,
            notes: req.notes,
            items: req
                .items
                .map(|items| items.into_iter().map(CreateItem::from).collect()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct InvoiceRequest {
    pub client_id: Uuid,
    pub payment_method: String,
    pub purchase_order: Option<String>,
    pub issue_date: NaiveDate,
    pub notes: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<ItemRequest>,
}

impl From<InvoiceRequest> for CreateInvoice {
    fn from(req: InvoiceRequest) -> Self {
        CreateInvoice {
            client_id: req.client_id,
            payment_method: req.payment_method,
            purchase_order: req.purchase_order,
            issue_date: req.issue_date,
            notes: req.notes,
            items: req.items.into_iter().map(CreateItem::from).collect(),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct DeliveryNoteRequest {
    pub client_id: Uuid,
    pub invoice_id: Option<Uuid>,
    pub issue_date: NaiveDate,
    pub notes: Option<String>,
    #[validate(length(min = 1), nested)]
    pub items: Vec<ItemRequest>,
}

impl From<DeliveryNoteRequest> for CreateDeliveryNote {
    fn from(req: DeliveryNoteRequest) -> Self {
        CreateDeliveryNote {
            client_id: req.client_id,
            invoice_id: req.invoice_id,
            issue_date: req.issue_date,
            notes: req.notes,
            items: req.items.into_iter().map(CreateItem::from).collect(),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct DeliveryNoteUpdateRequest {
    pub invoice_id: Option<Uuid>,
    pub issue_date: Option<NaiveDate>,
    pub notes: Option<String>,
    #[validate(nested)]
    pub items: Option<Vec<ItemRequest>>,
}

impl From<DeliveryNoteUpdateRequest> for UpdateDeliveryNote {
    fn from(req: DeliveryNoteUpdateRequest) -> Self {
        UpdateDeliveryNote {
            invoice_id: req.invoice_id,
            issue_date: req.issue_date,
            notes: req.notes,
            items: req
                .items
                .map(|items| items.into_iter().map(CreateItem::from).collect()),
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct PaymentRequest {
    #[validate(custom(function = validate_positive))]
    pub amount: Decimal,
    pub payment_date: NaiveDate,
    pub method: String,
    pub reference: Option<String>,
    pub notes: Option<String>,
}

/// Shared list-endpoint query parameters.
#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    pub client_id: Option<Uuid>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub search: Option<String>,
    #[serde(default = "default_page_size")]
    pub page_size: i32,
    pub page_token: Option<Uuid>,
}

fn default_page_size() -> i32 {
    50
}

// -----------------------------------------------------------------------------
// Responses
// -----------------------------------------------------------------------------

#[derive(Debug, Serialize)]
pub struct ItemResponse {
    pub item_id: Uuid,
    pub product_id: Option<Uuid>,
    pub name: String,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub tax_rate: Decimal,
    pub discount: Decimal,
    pub total_excl: Decimal,
    pub total_tax: Decimal,
    pub total: Decimal,
    pub sort_order: i32,
}

impl From<DocumentItem> for ItemResponse {
    fn from(item: DocumentItem) -> Self {
        ItemResponse {
            item_id: item.item_id,
            product_id: item.product_id,
            name: item.name,
            quantity: item.quantity,
            unit_price: item.unit_price,
            tax_rate: item.tax_rate,
            discount: item.discount,
            total_excl: item.total_excl,
            total_tax: item.total_tax,
            total: item.total,
            sort_order: item.sort_order,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ProformaResponse {
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
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemResponse>,
}

impl ProformaResponse {
    pub fn new(proforma: Proforma, items: Vec<DocumentItem>) -> Self {
        ProformaResponse {
            proforma_id: proforma.proforma_id,
            number: proforma.number,
            status: proforma.status,
            client_id: proforma.client_id,
            client_name: proforma.client_name,
            payment_method: proforma.payment_method,
            purchase_order: proforma.purchase_order,
            issue_date: proforma.issue_date,
            subtotal: proforma.subtotal,
            tax_total: proforma.tax_total,
            stamp_tax: proforma.stamp_tax,
            total: proforma.total,
            notes: proforma.notes,
            final_invoice_id: proforma.final_invoice_id,
            created_utc: proforma.created_utc,
            items: items.into_iter().map(ItemResponse::from).collect(),
        }
    }
}

/// The `status` field is always the derived status; the stored override
/// is exposed separately for administration screens.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    pub invoice_id: Uuid,
    pub number: String,
    pub status: String,
    pub stored_status: String,
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
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemResponse>,
}

impl InvoiceResponse {
    pub fn new(invoice: Invoice, items: Vec<DocumentItem>) -> Self {
        let derived = invoice.derived_status();
        InvoiceResponse {
            invoice_id: invoice.invoice_id,
            number: invoice.number,
            status: derived.as_str().to_string(),
            stored_status: invoice.status,
            client_id: invoice.client_id,
            client_name: invoice.client_name,
            payment_method: invoice.payment_method,
            purchase_order: invoice.purchase_order,
            issue_date: invoice.issue_date,
            subtotal: invoice.subtotal,
            tax_total: invoice.tax_total,
            stamp_tax: invoice.stamp_tax,
            total: invoice.total,
            amount_paid: invoice.amount_paid,
            client_debt: invoice.client_debt,
            notes: invoice.notes,
            proforma_id: invoice.proforma_id,
            created_utc: invoice.created_utc,
            items: items.into_iter().map(ItemResponse::from).collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DeliveryNoteResponse {
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
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub items: Vec<ItemResponse>,
}

impl DeliveryNoteResponse {
    pub fn new(note: DeliveryNote, items: Vec<DocumentItem>) -> Self {
        DeliveryNoteResponse {
            delivery_note_id: note.delivery_note_id,
            number: note.number,
            status: note.status,
            client_id: note.client_id,
            client_name: note.client_name,
            invoice_id: note.invoice_id,
            issue_date: note.issue_date,
            subtotal: note.subtotal,
            tax_total: note.tax_total,
            total: note.total,
            notes: note.notes,
            created_utc: note.created_utc,
            items: items.into_iter().map(ItemResponse::from).collect(),
        }
    }
}

pub type ClientResponse = Client;
pub type ProductResponse = Product;
pub type PaymentResponse = Payment;

/// Payment recording result. `notice` is set when the amount was clamped
/// to the remaining debt.
#[derive(Debug, Serialize)]
pub struct PaymentRecordedResponse {
    pub payment: PaymentResponse,
    pub clamped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    pub invoice: InvoiceResponse,
}
