//! Domain models for gescom-service.

mod client;
mod delivery_note;
mod invoice;
mod item;
mod payment;
mod product;
mod proforma;

pub use client::{Client, CreateClient, UpdateClient};
pub use delivery_note::{
    CreateDeliveryNote, DeliveryNote, DeliveryNoteStatus, ListDeliveryNotesFilter,
    UpdateDeliveryNote,
};
pub use invoice::{CreateInvoice, Invoice, InvoiceStatus, ListInvoicesFilter};
pub use item::{CreateItem, DocumentItem};
pub use payment::{CreatePayment, Payment, PaymentMethod};
pub use product::{CreateProduct, ListProductsFilter, Product, UpdateProduct};
pub use proforma::{
    CreateProforma, ListProformasFilter, Proforma, ProformaStatus, UpdateProforma,
};
