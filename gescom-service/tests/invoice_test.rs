//! Final invoice integration tests: creation totals, stamp duty,
//! deletion with number recycling, render fields, client references.

mod common;

use common::{create_test_client, create_test_invoice, dec_field, TestApp};
use serde_json::{json, Value};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn cash_invoice_carries_stamp_duty() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Timbre SARL").await;

    // 100 x 1500 = 150000 cash: 2% tier.
    let invoice = create_test_invoice(&app, &client_id, 100, "1500", "19", "cash").await;
    assert_eq!(dec_field(&invoice, "subtotal"), 150000.0);
    assert_eq!(dec_field(&invoice, "stamp_tax"), 3000.0);
    let expected_total = 150000.0 + dec_field(&invoice, "tax_total") + 3000.0;
    assert!((dec_field(&invoice, "total") - expected_total).abs() < 0.01);

    // Same document by bank transfer: no stamp duty.
    let invoice = create_test_invoice(&app, &client_id, 100, "1500", "19", "bank_transfer").await;
    assert_eq!(dec_field(&invoice, "stamp_tax"), 0.0);
}

#[tokio::test]
#[serial]
async fn item_amounts_are_derived_on_creation() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Lignes SARL").await;
    let invoice = create_test_invoice(&app, &client_id, 10, "100", "19", "bank_transfer").await;

    let items = invoice["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(dec_field(&items[0], "total_excl"), 1000.0);
    assert_eq!(dec_field(&items[0], "total_tax"), 190.0);
    assert_eq!(dec_field(&items[0], "total"), 1190.0);
    assert_eq!(dec_field(&invoice, "total"), 1190.0);
}

#[tokio::test]
#[serial]
async fn deleted_invoice_numbers_are_recycled_oldest_first() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Recyclage SARL").await;

    let invoice = create_test_invoice(&app, &client_id, 1, "100", "0", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();
    let number = invoice["number"].as_str().unwrap().to_string();

    let response = app
        .client
        .delete(app.url(&format!("/api/invoices/{}", invoice_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);

    // The pool is drained oldest-first, so the freed number comes back
    // within a bounded series of new invoices.
    let mut reused = false;
    for _ in 0..20 {
        let invoice = create_test_invoice(&app, &client_id, 1, "100", "0", "bank_transfer").await;
        if invoice["number"].as_str().unwrap() == number {
            reused = true;
            break;
        }
    }
    assert!(reused, "freed invoice number {} was never reused", number);
}

#[tokio::test]
#[serial]
async fn paid_invoices_cannot_be_deleted() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Suppression SARL").await;
    let invoice = create_test_invoice(&app, &client_id, 1, "100", "0", "bank_transfer").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let response = app
        .post(
            &format!("/api/invoices/{}/payments", invoice_id),
            &json!({
                "amount": "40",
                "payment_date": "2026-01-20",
                "method": "cash"
            }),
        )
        .await;
    assert_eq!(response.status(), 201);

    let response = app
        .client
        .delete(app.url(&format!("/api/invoices/{}", invoice_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

#[tokio::test]
#[serial]
async fn referenced_clients_cannot_be_deleted() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Référencé SARL").await;
    create_test_invoice(&app, &client_id, 1, "100", "0", "bank_transfer").await;

    let response = app
        .client
        .delete(app.url(&format!("/api/clients/{}", client_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 409);

    // A client with no documents deletes fine.
    let other_id = create_test_client(&app, "Libre SARL").await;
    let response = app
        .client
        .delete(app.url(&format!("/api/clients/{}", other_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 204);
}

#[tokio::test]
#[serial]
async fn render_exposes_flat_fields_and_item_rows() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Gabarit SARL").await;
    let invoice = create_test_invoice(&app, &client_id, 10, "100", "19", "cash").await;
    let invoice_id = invoice["invoice_id"].as_str().unwrap();

    let body: Value = app
        .get_json(&format!("/api/invoices/{}/render", invoice_id))
        .await;

    let fields = body["fields"].as_object().unwrap();
    assert_eq!(fields["client.name"], "Gabarit SARL");
    assert_eq!(fields["client.tax_id"], "099912345678901");
    assert_eq!(fields["status"], "unpaid");
    assert_eq!(fields["subtotal"], "1000.00");
    assert_eq!(fields["tax_total"], "190.00");
    assert_eq!(fields["stamp_tax"], "10.00");
    assert_eq!(fields["total"], "1200.00");
    assert!(fields["number"].as_str().unwrap().starts_with("F-"));

    let rows = body["items"].as_array().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0]["name"], "Prestation");
    assert_eq!(rows[0]["quantity"], "10");
    assert_eq!(rows[0]["unit_price"], "100.00");
}

#[tokio::test]
#[serial]
async fn delivery_note_lifecycle() {
    let Some(app) = TestApp::spawn().await else { return };

    let client_id = create_test_client(&app, "Livraison SARL").await;
    let response = app
        .post(
            "/api/delivery-notes",
            &json!({
                "client_id": client_id,
                "issue_date": "2026-01-18",
                "items": [{
                    "name": "Colis",
                    "quantity": 3,
                    "unit_price": "40",
                    "tax_rate": "19"
                }]
            }),
        )
        .await;
    assert_eq!(response.status(), 201);
    let note: Value = response.json().await.unwrap();
    let note_id = note["delivery_note_id"].as_str().unwrap();
    assert_eq!(note["status"], "pending");
    assert!(note["number"].as_str().unwrap().starts_with("BL-"));

    let response = app
        .post_empty(&format!("/api/delivery-notes/{}/deliver", note_id))
        .await;
    assert_eq!(response.status(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["status"], "delivered");

    // Delivered notes are frozen.
    let response = app
        .post_empty(&format!("/api/delivery-notes/{}/cancel", note_id))
        .await;
    assert_eq!(response.status(), 400);
    let response = app
        .client
        .delete(app.url(&format!("/api/delivery-notes/{}", note_id)))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}
