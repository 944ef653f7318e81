//! HTTP handlers for gescom-service.

mod clients;
mod delivery_notes;
mod invoices;
mod payments;
mod products;
mod proformas;
mod render;

use crate::startup::AppState;
use axum::routing::{get, post};
use axum::Router;

/// Assemble the API router.
pub fn api_router() -> Router<AppState> {
    Router::new()
        .route(
            "/api/clients",
            post(clients::create_client).get(clients::list_clients),
        )
        .route(
            "/api/clients/:client_id",
            get(clients::get_client)
                .put(clients::update_client)
                .delete(clients::delete_client),
        )
        .route(
            "/api/products",
            post(products::create_product).get(products::list_products),
        )
        .route(
            "/api/products/:product_id",
            get(products::get_product)
                .put(products::update_product)
                .delete(products::delete_product),
        )
        .route(
            "/api/proformas",
            post(proformas::create_proforma).get(proformas::list_proformas),
        )
        .route(
            "/api/proformas/:proforma_id",
            get(proformas::get_proforma)
                .put(proformas::update_proforma)
                .delete(proformas::delete_proforma),
        )
        .route("/api/proformas/:proforma_id/send", post(proformas::send_proforma))
        .route(
            "/api/proformas/:proforma_id/approve",
            post(proformas::approve_proforma),
        )
        .route(
            "/api/proformas/:proforma_id/reject",
            post(proformas::reject_proforma),
        )
        .route(
            "/api/proformas/:proforma_id/unapprove",
            post(proformas::unapprove_proforma),
        )
        .route(
            "/api/proformas/:proforma_id/convert",
            post(proformas::convert_proforma),
        )
        .route(
            "/api/proformas/:proforma_id/undo-conversion",
            post(proformas::undo_conversion),
        )
        .route(
            "/api/proformas/:proforma_id/render",
            get(render::render_proforma),
        )
        .route(
            "/api/invoices",
            post(invoices::create_invoice).get(invoices::list_invoices),
        )
        .route(
            "/api/invoices/:invoice_id",
            get(invoices::get_invoice).delete(invoices::delete_invoice),
        )
        .route(
            "/api/invoices/:invoice_id/mark-paid",
            post(invoices::mark_invoice_paid),
        )
        .route("/api/invoices/:invoice_id/cancel", post(invoices::cancel_invoice))
        .route("/api/invoices/:invoice_id/credit", post(invoices::credit_invoice))
        .route("/api/invoices/:invoice_id/revert", post(invoices::revert_invoice))
        .route("/api/invoices/:invoice_id/render", get(render::render_invoice))
        .route(
            "/api/invoices/:invoice_id/payments",
            post(payments::add_payment).get(payments::list_payments),
        )
        .route(
            "/api/invoices/:invoice_id/payments/:payment_id",
            axum::routing::delete(payments::delete_payment),
        )
        .route(
            "/api/delivery-notes",
            post(delivery_notes::create_delivery_note).get(delivery_notes::list_delivery_notes),
        )
        .route(
            "/api/delivery-notes/:delivery_note_id",
            get(delivery_notes::get_delivery_note)
                .put(delivery_notes::update_delivery_note)
                .delete(delivery_notes::delete_delivery_note),
        )
        .route(
            "/api/delivery-notes/:delivery_note_id/deliver",
            post(delivery_notes::deliver_delivery_note),
        )
        .route(
            "/api/delivery-notes/:delivery_note_id/cancel",
            post(delivery_notes::cancel_delivery_note),
        )
        .route(
            "/api/delivery-notes/:delivery_note_id/render",
            get(render::render_delivery_note),
        )
}
